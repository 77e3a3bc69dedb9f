use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("capture device already active")]
    AlreadyActive,
    #[error("chunk cadence must be positive, got {cadence_ms} ms")]
    InvalidCadence { cadence_ms: u64 },
    #[error("capture permission denied")]
    PermissionDenied,
    #[error("capture device lost: {message}")]
    DeviceLost { message: String },
}

impl CaptureError {
    pub fn device_lost(message: impl Into<String>) -> Self {
        Self::DeviceLost {
            message: message.into(),
        }
    }
}
