use serde::Serialize;
use thiserror::Error;

/// Errors produced by the capture engine and its platform collaborators.
///
/// Runtime conditions (`PermissionDenied`, `MetadataUnavailable`, ...) are
/// folded into `EngineState::last_error`. Misuse by the host UI
/// (`NoActiveStream`, `NoRecorder`, `InvalidTransition`, ...) is returned
/// to the caller instead.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CaptureError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("no media stream")]
    NoActiveStream,

    #[error("no media recorder")]
    NoRecorder,

    #[error("already recording")]
    AlreadyRecording,

    #[error("cannot {operation} while {status}")]
    InvalidTransition { operation: &'static str, status: String },

    #[error("unable to obtain metadata: {0}")]
    MetadataUnavailable(String),

    #[error("capture engine is not active")]
    NotActive,

    #[error("captured media must be cleared before reactivation")]
    CapturePending,

    #[error("device not available")]
    DeviceNotAvailable,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CaptureError {
    /// Whether the error signals a bug in the calling UI rather than a
    /// runtime condition.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::NoActiveStream
                | Self::NoRecorder
                | Self::AlreadyRecording
                | Self::InvalidTransition { .. }
                | Self::NotActive
                | Self::CapturePending
        )
    }

    /// Normalize any acquisition failure into `PermissionDenied`.
    ///
    /// Platforms report refusals in many shapes (device busy, transport
    /// exceptions, explicit denial); the engine treats them all alike.
    pub fn into_denial(self) -> Self {
        match self {
            Self::PermissionDenied(_) => self,
            other => Self::PermissionDenied(other.to_string()),
        }
    }

    pub(crate) fn invalid(operation: &'static str, status: impl ToString) -> Self {
        Self::InvalidTransition {
            operation,
            status: status.to_string(),
        }
    }
}
