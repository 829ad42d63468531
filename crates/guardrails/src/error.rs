use thiserror::Error;

use warden_core::DagError;

/// Errors from guardrail registration and persistence.
#[derive(Debug, Error)]
pub enum GuardrailError {
    /// The registration body failed validation.
    #[error("invalid guardrail '{id}': {reason}")]
    Invalid { id: String, reason: String },

    /// A composite tree failed shape validation.
    #[error("invalid composite tree for '{id}': {source}")]
    InvalidDag {
        id: String,
        #[source]
        source: DagError,
    },

    /// No guardrail registered under the id.
    #[error("guardrail '{0}' not found")]
    NotFound(String),

    /// Persisting or loading a dynamic guardrail failed.
    #[error("guardrail persistence error: {0}")]
    Persistence(String),
}
