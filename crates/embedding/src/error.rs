use thiserror::Error;

/// Errors from embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Provider configuration is invalid.
    #[error("embedding configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure reaching the provider.
    #[error("embedding http error: {0}")]
    HttpError(String),

    /// The provider returned a non-success status.
    #[error("embedding api error: {0}")]
    ApiError(String),

    /// The provider response could not be parsed.
    #[error("embedding parse error: {0}")]
    ParseError(String),

    /// The provider did not respond within its deadline.
    #[error("embedding request timed out")]
    Timeout,
}
