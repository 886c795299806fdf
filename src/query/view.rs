use serde::Serialize;
use uuid::Uuid;

use super::generation::Generation;
use crate::error::FailureClass;
use crate::models::CaseFilter;

/// Non-item state a list view renders alongside (or instead of) its rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewNotice {
    /// Previously loaded rows stay visible; show a dismissable banner.
    StaleData { message: String },
    /// The query matched nothing.
    Empty,
    /// Nothing found and nothing to fall back on.
    NotFound { message: String },
    PermissionDenied { message: String },
    /// Nothing to show; offer a manual retry.
    Blocking { message: String, retryable: bool },
    /// The server returned an id that is already listed.
    ContractViolation { duplicate_id: Uuid },
}

impl ViewNotice {
    /// Whether the notice replaces the list rather than decorating it.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::PermissionDenied { .. } | Self::Blocking { .. }
        )
    }
}

/// Owned copy of a view's visible state, safe to hand to a renderer.
#[derive(Debug, Clone)]
pub struct ViewSnapshot<T> {
    pub generation: Generation,
    pub filter: CaseFilter,
    pub items: Vec<T>,
    pub has_more: bool,
    pub loading: bool,
    pub notice: Option<ViewNotice>,
}

/// Why a pull was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InFlight,
    AwaitingFirstPage,
    Exhausted,
    NothingToRetry,
    Closed,
}

/// What a fetch did to the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied { page: u32, received: usize },
    Skipped(SkipReason),
    /// Response belonged to an older generation and was dropped.
    Stale,
    Failed(FailureClass),
    ContractViolation { duplicate_id: Uuid },
}
