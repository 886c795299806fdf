//! Failure taxonomy shared by the store client, the guard and the views.
//!
//! Only transport and permission failures ever reach the user as banners or
//! messages. Guard rejections are inline and local; stale responses are
//! dropped silently (debug log only).

use thiserror::Error;

use crate::guard::Rejection;

/// Errors returned by a [`crate::store::CaseStore`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Cannot reach case service: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Permission denied")]
    Forbidden,

    #[error("{0}")]
    Rejected(Rejection),

    #[error("Case service error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Malformed response from case service: {0}")]
    Decode(String),
}

/// How a failure is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Outright fetch failure: fall back to cached data, else block with retry.
    Network,
    /// No data for this query.
    NotFound,
    /// 401/403. Never masked with stale data.
    PermissionDenied,
    /// Guard rejection: inline, non-fatal, nothing applied.
    Rejected,
}

impl StoreError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Network(_) | Self::Server { .. } | Self::Decode(_) => FailureClass::Network,
            Self::NotFound(_) => FailureClass::NotFound,
            Self::Unauthorized | Self::Forbidden => FailureClass::PermissionDenied,
            Self::Rejected(_) => FailureClass::Rejected,
        }
    }

    /// Whether previously loaded data may stand in for the failed result.
    pub fn allows_fallback(&self) -> bool {
        matches!(self.class(), FailureClass::Network | FailureClass::NotFound)
    }

    /// Map a non-success HTTP status to the taxonomy.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound(if body.is_empty() {
                "no data for this query".into()
            } else {
                body
            }),
            _ => Self::Server { status, body },
        }
    }
}
