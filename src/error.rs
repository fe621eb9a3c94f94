//! Error types for policy evaluation
//!
//! Callers only ever see `InvalidRequest`, the store failures, `Aborted`
//! (async façade) or configuration errors. Malformed policy data and cache
//! outages are absorbed inside the engine and only show up in the logs.

use thiserror::Error;

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced to callers of the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Request was null, undecodable, or missing a required field
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Policy store query failed (retryable)
    #[error("Policy store unavailable: {0}")]
    StoreUnavailable(String),

    /// Policy store query exceeded its budget (retryable)
    #[error("Policy store timed out after {elapsed_ms}ms (budget {budget_ms}ms)")]
    StoreTimeout { elapsed_ms: u64, budget_ms: u64 },

    /// Evaluation task did not complete (async façade only)
    #[error("Evaluation aborted: {0}")]
    Aborted(String),

    /// Engine configuration rejected
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl EngineError {
    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StoreUnavailable(_) | EngineError::StoreTimeout { .. }
        )
    }
}

/// Failure reported by a policy store implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query timed out after {0}ms")]
    Timeout(u64),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
            StoreError::Timeout(ms) => EngineError::StoreTimeout {
                elapsed_ms: ms,
                budget_ms: ms,
            },
        }
    }
}

/// Failure reported by a cache store implementation
///
/// Never reaches the caller; the decision cache logs it and degrades.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("cache entry could not be (de)serialized: {0}")]
    Serialization(String),
}
