use dashdrop_types::models::RequestStatus;

/// Failures surfaced by request operations. None of these are fatal; each is
/// scoped to the single operation that produced it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("persistence failed: {0}")]
    Persistence(#[from] anyhow::Error),

    #[error("Request already accepted by another dasher")]
    Conflict { request_id: String },

    #[error("cannot move request from {from} to {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },

    #[error("request {0} not found")]
    NotFound(String),

    #[error("unknown status: {0}")]
    UnknownStatus(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
