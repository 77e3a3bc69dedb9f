use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("bind error: {0}")]
    Bind(std::io::Error),
    #[error("accept error: {0}")]
    Accept(std::io::Error),
}
