use std::error::Error as StdError;

use thiserror::Error;

/// Recap's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Recap's crate-wide error type.
///
/// Failure classes are explicit variants so callers can tell a rejected upload
/// apart from a missing model or a failed generation pass. This is intentionally
/// decoupled from `anyhow` so downstream libraries aren't forced to adopt
/// `anyhow` in their own public APIs.
#[derive(Debug, Error)]
pub enum Error {
    /// The upload did not look like any audio container we accept.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The container/codec layer could not produce decoded samples.
    #[error("failed to decode audio: {0}")]
    Decode(String),

    /// A required model is not loaded or could not be loaded.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// The generation model failed while producing a summary.
    ///
    /// Callers are expected to fall back to extractive summarization rather
    /// than surface this to clients.
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub(crate) fn decode(message: impl ToString) -> Self {
        Self::Decode(message.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}
