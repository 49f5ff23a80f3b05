//! Error taxonomy for VCR orchestration.

/// Errors that abort a VCR run before it can reach a terminal state.
///
/// Test failures and non-zero exits of the test binary are data, not errors;
/// they are carried in [`crate::domain::PhaseRun`].
#[derive(Debug, thiserror::Error)]
pub enum VcrError {
    #[error("setup failed during {stage}: {reason}")]
    Setup { stage: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VcrError {
    pub fn setup(stage: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        VcrError::Setup {
            stage: stage.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for VCR orchestration.
pub type Result<T> = std::result::Result<T, VcrError>;
