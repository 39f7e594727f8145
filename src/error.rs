use thiserror::Error;

/// Errors that can stop a captioning run or prevent one from starting.
///
/// Only the inference and image-loading variants are raised while a run is
/// in flight; persistence and clipboard problems are logged and swallowed.
#[derive(Error, Debug)]
pub enum CaptionError {
    #[error("Cannot connect to KoboldCpp at {0}: {1}")]
    Connection(String, String),

    #[error("KoboldCpp returned HTTP {0}: {1}")]
    Server(u16, String),

    #[error("Invalid response from KoboldCpp: {0}")]
    InvalidResponse(String),

    #[error("Failed to read image: {0}")]
    ImageRead(String),

    #[error("Failed to encode image: {0}")]
    ImageEncode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No files selected")]
    NoFiles,

    #[error("A run is already in progress")]
    AlreadyRunning,

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for CaptionError {
    fn from(err: tokio::task::JoinError) -> Self {
        CaptionError::Worker(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CaptionError>;
