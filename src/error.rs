//! Error types at the library seams

use thiserror::Error;

use crate::capture::SourceKind;

/// Failure to acquire a capture device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The user or the operating system refused access
    #[error("Permission denied for {0}")]
    PermissionDenied(SourceKind),

    /// The user dismissed the source picker
    #[error("Selection cancelled for {0}")]
    Cancelled(SourceKind),

    #[error("{0} capture unavailable: {1}")]
    Unavailable(SourceKind, String),

    #[error("Device error: {0}")]
    Device(String),
}

impl CaptureError {
    /// Cancellation is a silent return to the prior state, never an error message
    pub fn is_user_cancellation(&self) -> bool {
        matches!(self, CaptureError::Cancelled(_))
    }

    /// Message shown to the user for genuine acquisition failures
    pub fn user_message(&self) -> Option<String> {
        match self {
            CaptureError::Cancelled(_) => None,
            CaptureError::PermissionDenied(SourceKind::Camera)
            | CaptureError::Unavailable(SourceKind::Camera, _) => Some(
                "Failed to access camera/microphone. Please check permissions.".to_string(),
            ),
            CaptureError::PermissionDenied(SourceKind::Display)
            | CaptureError::Unavailable(SourceKind::Display, _) => {
                Some("Failed to share screen.".to_string())
            }
            CaptureError::Device(msg) => Some(format!("Capture device error: {}", msg)),
        }
    }
}

/// Failure reported by the recording pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    /// Recording needs a composited output surface to sample
    #[error("No output surface to record")]
    NoSurface,

    /// No encoder supports the requested container/codec
    #[error("Encoder unavailable for '{mime_type}': {reason}")]
    EncoderUnavailable { mime_type: String, reason: String },

    #[error("Encoder failed to start: {0}")]
    EncoderStart(String),
}
