use thiserror::Error;

/// Errors surfaced by the Doctor GPT pipeline and its adapters.
#[derive(Debug, Error)]
pub enum RagError {
    /// An external service (embedding or generation API) rejected a call
    /// or returned an unusable payload.
    #[error("Upstream service error ({service}): {message}")]
    UpstreamService { service: String, message: String },

    /// The corpus store rejected a call or returned an unusable payload.
    #[error("Corpus store error ({backend}): {message}")]
    Store { backend: String, message: String },

    /// Caller-supplied input failed validation before any external call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external call exceeded its deadline.
    #[error("Timed out waiting for {service}")]
    Timeout { service: String },

    /// The pipeline or an adapter was misconfigured.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;
