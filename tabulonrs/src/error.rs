use thiserror::Error;

pub type Result<T> = std::result::Result<T, TabulonError>;

#[derive(Debug, Error)]
pub enum TabulonError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("lock contention: {0}")]
    LockContention(String),
    #[error("execution error: {0}")]
    Execution(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
