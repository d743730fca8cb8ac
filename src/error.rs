use crate::config::ConfigError;
use crate::orchestration::PipelineError;
use thiserror::Error;

/// Top-level error of the journal binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl AppError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => 2,
            AppError::Pipeline(PipelineError::Strict { .. }) => 3,
            _ => 1,
        }
    }
}
