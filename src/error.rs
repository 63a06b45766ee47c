//! Error types for Beacon voice

use thiserror::Error;

/// Result type alias for Beacon voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Beacon voice
///
/// These surface from the outer layers (configuration, adapters, backend
/// client). The interaction controller itself absorbs its failures and turns
/// them into state transitions.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio output error
    #[error("audio error: {0}")]
    Audio(String),

    /// Backend reply service error
    #[error("backend error: {0}")]
    Backend(String),

    /// Reminder store error
    #[error("reminder error: {0}")]
    Reminder(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
