use thiserror::Error;

use crate::store::StoreError;

/// Engine-level error taxonomy surfaced to callers.
///
/// "No path within max_hops" and "zero matches" are legitimate results and
/// never appear here. `kind()` is stable across versions so callers can match
/// on it; messages are for humans only.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Transient infrastructure failure; retryable by the caller with backoff.
    #[error("graph store unavailable: {0}")]
    StoreUnavailable(String),
    /// Operation exceeded the caller-supplied budget. Weight writes are
    /// per-edge atomic, so retrying is safe.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::NotFound(_) => "not_found",
            EngineError::StoreUnavailable(_) => "store_unavailable",
            EngineError::Timeout(_) => "timeout",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StoreUnavailable(_) | EngineError::Timeout(_)
        )
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(msg) => EngineError::NotFound(msg),
            StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
            StoreError::Mapping(msg) => {
                EngineError::StoreUnavailable(format!("row mapping failed: {msg}"))
            }
        }
    }
}
