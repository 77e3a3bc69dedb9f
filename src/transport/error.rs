use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {message}")]
    ConnectFailed { message: String },
    #[error("channel send failed")]
    Send,
    #[error("channel already closed")]
    Closed,
}

impl TransportError {
    pub fn connect_failed(message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            message: message.into(),
        }
    }
}
