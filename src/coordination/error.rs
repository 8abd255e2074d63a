use thiserror::Error;

/// Result type for coordination operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Error types for coordination operations
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Remote error: {0}")]
    RemoteError(String),

    #[error("Invalid peer: {0}")]
    InvalidPeer(String),

    #[error("Timeout error")]
    TimeoutError,
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::TimeoutError
        } else if err.is_connect() {
            NetworkError::ConnectionError(err.to_string())
        } else {
            NetworkError::RequestFailed(err.to_string())
        }
    }
}
