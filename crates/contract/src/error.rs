use thiserror::Error;

use warden_core::CircuitOpen;

/// Errors from a contract source backend.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level failure reaching the registry.
    #[error("contract source http error: {0}")]
    Http(String),

    /// The registry returned a non-success, non-404 status.
    #[error("contract source returned status {0}")]
    Status(u16),

    /// The document could not be parsed.
    #[error("contract parse error: {0}")]
    Parse(String),

    /// Filesystem failure (directory source).
    #[error("contract source io error: {0}")]
    Io(#[from] std::io::Error),

    /// The source did not respond within its deadline.
    #[error("contract source timed out")]
    Timeout,
}

/// Errors surfaced by contract resolution.
///
/// `Revoked` and `Expired` are distinct kinds so the gateway can report them
/// differently from a plain miss.
#[derive(Debug, Error)]
pub enum ContractError {
    /// No contract exists under the given id.
    #[error("contract '{0}' not found")]
    NotFound(String),

    /// The contract was withdrawn by its issuer.
    #[error("contract '{0}' is revoked")]
    Revoked(String),

    /// The contract's validity window has ended (or its status says so).
    #[error("contract '{0}' is expired")]
    Expired(String),

    /// The document failed validation (wrong status, missing digest, ...).
    #[error("contract '{id}' is invalid: {reason}")]
    Invalid { id: String, reason: String },

    /// The source could not be reached (including circuit-open fast failures).
    #[error("contract source unavailable: {0}")]
    Unavailable(String),
}

impl From<CircuitOpen> for ContractError {
    fn from(err: CircuitOpen) -> Self {
        Self::Unavailable(err.to_string())
    }
}
