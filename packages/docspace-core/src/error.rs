use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("invalid change: {0}")]
    InvalidChange(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("branch closed: {0}")]
    BranchClosed(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("integrity error: {0}")]
    Integrity(String),
}
