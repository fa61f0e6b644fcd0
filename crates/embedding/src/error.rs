use thiserror::Error;

/// Errors surfaced by the embedding layer.
#[derive(Debug, Error, Clone)]
pub enum EmbeddingError {
    /// Configuration is inconsistent (e.g., api mode without an api_url).
    #[error("invalid embedding config: {0}")]
    InvalidConfig(String),
    /// The remote provider call failed (HTTP error, timeout, bad status).
    #[error("provider call failed: {0}")]
    Provider(String),
    /// The provider responded but the payload could not be interpreted.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    /// The provider is not reachable or has been closed.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// The provider does not implement the requested capability.
    #[error("unsupported capability: {0}")]
    Unsupported(String),
}
