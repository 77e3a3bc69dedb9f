use thiserror::Error;

use crate::capture::CaptureError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("capture permission denied")]
    PermissionDenied,
    #[error("capture device lost: {message}")]
    DeviceLost { message: String },
    #[error("duplex channel could not open: {message}")]
    ConnectFailed { message: String },
    #[error("reconnect attempts exhausted after {attempts}")]
    ReconnectExhausted { attempts: u32 },
    #[error("capture error: {0}")]
    Capture(CaptureError),
    #[error("internal session error: {message}")]
    Internal { message: String },
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => Self::PermissionDenied,
            CaptureError::DeviceLost { message } => Self::DeviceLost { message },
            other => Self::Capture(other),
        }
    }
}
