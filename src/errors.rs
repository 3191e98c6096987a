use thiserror::Error;

use crate::backup::Stage;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dump failed: {0}")]
    Dump(String),

    #[error("{stage} failed: {detail}")]
    Transform { stage: Stage, detail: String },

    #[error("Upload to {destination} failed: {detail}")]
    Upload { destination: String, detail: String },

    #[error("Saving dump metadata failed: {0}")]
    Record(String),

    #[error("Removing local dump failed: {0}")]
    Cleanup(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// Warnings never stop the run; everything else aborts it.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BackupError::Upload { .. } | BackupError::Record(_) | BackupError::Cleanup(_)
        )
    }

    pub fn config(message: impl Into<String>) -> Self {
        BackupError::Configuration(message.into())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
