//! Error types for test process execution.

use std::path::PathBuf;
use thiserror::Error;

use magician_core::VcrError;

/// Failures that prevent the test binary from running at all.
///
/// A test process that started and exited non-zero is not an error here;
/// see [`magician_core::PhaseRun::exit_error`].
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("provider repository not found at {0}")]
    RepoNotConfigured(PathBuf),

    #[error("package discovery failed: {0}")]
    PackageDiscovery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<RunnerError> for VcrError {
    fn from(err: RunnerError) -> Self {
        VcrError::setup("test execution", err)
    }
}
