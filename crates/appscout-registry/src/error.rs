//! Error types for the app registry.

use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur while scanning, caching or resolving the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error from the durable store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Non-success response from the hosting API.
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// Rate limited by the hosting API.
    #[error("rate limited on {endpoint}")]
    RateLimited { endpoint: String },

    /// Durable store failure not covered by IO.
    #[error("store error: {0}")]
    Store(String),

    /// A registry key did not carry a known namespace.
    #[error("invalid registry key: {0}")]
    InvalidKey(String),

    /// A failed build whose error is handed to every caller that waited on it.
    #[error(transparent)]
    Shared(Arc<RegistryError>),
}

impl RegistryError {
    /// Whether the error means the hosting API throttled us.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            RegistryError::RateLimited { .. } => true,
            RegistryError::Shared(inner) => inner.is_rate_limited(),
            _ => false,
        }
    }
}
