use thiserror::Error;

/// Errors from the judge model client.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// Client configuration is invalid.
    #[error("judge configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure reaching the judge endpoint.
    #[error("judge http error: {0}")]
    HttpError(String),

    /// The judge API returned a non-success status.
    #[error("judge api error: {0}")]
    ApiError(String),

    /// The judge's output was not a valid structured judgement. Evaluators
    /// fall back to their keyword branch on this kind.
    #[error("judge parse error: {0}")]
    ParseError(String),

    /// The judge did not answer within its deadline.
    #[error("judge request timed out after {0} seconds")]
    Timeout(u64),
}
