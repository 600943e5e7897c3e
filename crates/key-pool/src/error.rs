//! Error types for pool operations
//!
//! Pool exhaustion is not an error: `KeyPool::acquire` returns `Ok(None)`.

/// Errors from the quarantine store. Either variant means the durable
/// state could not be trusted for this call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("quarantine store unavailable: {0}")]
    Persistence(String),

    #[error("quarantine store malformed: {0}")]
    Malformed(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
