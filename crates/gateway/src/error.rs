use thiserror::Error;

/// Errors constructing the enforcement pipeline.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A required dependency was not supplied to the builder.
    #[error("gateway builder is missing required dependency: {0}")]
    MissingDependency(&'static str),

    /// Configuration values are inconsistent.
    #[error("gateway configuration error: {0}")]
    Configuration(String),
}
