use thiserror::Error;

/// Errors surfaced by cache backends.
///
/// Backend failures never panic and never silently degrade: callers receive
/// the error and decide whether to treat it as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend rejected or failed the operation.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// The backend did not respond within its deadline.
    #[error("cache operation timed out after {0} ms")]
    Timeout(u64),

    /// A stored value could not be (de)serialized.
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
