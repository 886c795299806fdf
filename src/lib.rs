//! Clinical case lifecycle reconciler.
//!
//! Derives a case's canonical status from its orders, guards pharmacy and
//! lab transitions, and keeps paginated case lists and medicine
//! autocomplete consistent under rapid input and out-of-order responses.

pub mod config;
pub mod error;
pub mod guard;
pub mod models;
pub mod query;
pub mod status;
pub mod store;
pub mod suggestions;
pub mod upload;

use tracing_subscriber::EnvFilter;

pub use error::{FailureClass, StoreError};
pub use guard::{Decision, Rejection};
pub use query::QueryOrchestrator;
pub use status::{derive_status, CanonicalStatus};
pub use store::{CaseStore, HttpCaseStore, MemoryCaseStore};
pub use suggestions::SuggestionEngine;

/// Install the global fmt subscriber. `RUST_LOG` wins over the default filter.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
