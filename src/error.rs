//! Error types for MirrorMind

use thiserror::Error;

/// Result type alias for MirrorMind operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in MirrorMind
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input: empty content or an unknown role.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// No LLM credential could be resolved at startup.
    #[error("No LLM backend configured: {0}")]
    NoBackendConfigured(String),

    /// The backend timed out, could not be reached, or returned an unusable reply.
    #[error("LLM backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Registration error: {0}")]
    Registration(String),

    /// Only ever logged during shutdown.
    #[error("Deregistration failed: {0}")]
    Deregistration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors that must stop the process before it starts accepting turns.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            Error::NoBackendConfigured(_) | Error::Registration(_) | Error::Config(_)
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
