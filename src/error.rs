//! Error types shared by every capture component

use thiserror::Error;

/// Errors that can occur while acquiring devices, analysing audio or
/// decoding recorded blobs
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Audio capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("Failed to decode audio: {0}")]
    DecodeError(String),

    #[error("Analysis failed: {0}")]
    Analysis(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AudioError {
    /// Classify a platform error message as a permission or availability failure
    pub fn from_platform(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let refused = ["permission", "denied", "not authorized", "unauthorized", "not permitted"];
        if refused.iter().any(|needle| lower.contains(needle)) {
            AudioError::PermissionDenied(message)
        } else {
            AudioError::CaptureUnavailable(message)
        }
    }

    /// Whether this error came from acquiring a device
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            AudioError::PermissionDenied(_) | AudioError::CaptureUnavailable(_)
        )
    }
}

pub type Result<T, E = AudioError> = std::result::Result<T, E>;
