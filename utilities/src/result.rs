use thiserror::Error;

/// Error kinds for the whole workspace. The first four are recoverable and
/// travel back to the client inside the response envelope; `Internal` only
/// ever terminates the connection loop that hit it.
#[derive(Debug, Error)]
pub enum DfsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("no capacity: {0}")]
    NoCapacity(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl DfsError {
    /// True when the error should be written into the response envelope and
    /// the connection kept open.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DfsError::Internal(_))
    }
}

impl From<std::io::Error> for DfsError {
    fn from(e: std::io::Error) -> Self {
        DfsError::Internal(format!("io: {e}"))
    }
}

impl From<serde_json::Error> for DfsError {
    fn from(e: serde_json::Error) -> Self {
        DfsError::Internal(format!("decode: {e}"))
    }
}

impl From<std::num::ParseIntError> for DfsError {
    fn from(e: std::num::ParseIntError) -> Self {
        DfsError::BadRequest(format!("invalid integer argument: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, DfsError>;
