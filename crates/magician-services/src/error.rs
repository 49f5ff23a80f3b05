//! Error types for remote collaborators.

use thiserror::Error;

/// Errors raised by cassette storage, log storage or the review platform.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// An external command could not be launched or exited non-zero.
    #[error("command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote API answered with a non-success status.
    #[error("{service} returned status {status}: {body}")]
    Api {
        service: String,
        status: u16,
        body: String,
    },

    #[error("no cassettes found at {0}")]
    MissingCassettes(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for collaborator operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
