use crate::core::request::DownloadId;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApkdlError>;

#[derive(Error, Debug)]
pub enum ApkdlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid source location '{location}': {reason}")]
    InvalidSourceLocation { location: String, reason: String },

    #[error("Destination already exists: {path}")]
    DestinationConflict { path: PathBuf },

    #[error("No destination set for the download")]
    DestinationNotSet,

    #[error("Download already started with id {id}")]
    DoubleStart { id: DownloadId },

    #[error("Download has not been started")]
    NotStarted,

    #[error("Download service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Transfer {id} failed: {reason}")]
    TransferFailed { id: DownloadId, reason: String },

    #[error("Install failed: {message}")]
    InstallFailed { message: String },

    #[error("Timed out after {seconds}s waiting for download {id}")]
    Timeout { id: DownloadId, seconds: u64 },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Home directory not found")]
    HomeDirectoryNotFound,

    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },
}

impl ApkdlError {
    pub fn config_error<S: Into<String>>(message: S) -> Self {
        ApkdlError::ConfigError {
            message: message.into(),
        }
    }

    pub fn service_unavailable<S: Into<String>>(message: S) -> Self {
        ApkdlError::ServiceUnavailable {
            message: message.into(),
        }
    }

    pub fn install_failed<S: Into<String>>(message: S) -> Self {
        ApkdlError::InstallFailed {
            message: message.into(),
        }
    }
}
