use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Record '{1}' not found in collection '{0}'")]
    RecordNotFound(String, String),

    #[error("Invalid status transition from '{0}' to '{1}'")]
    InvalidTransition(String, String),

    #[error("Storage corruption in '{0}': {1}")]
    StorageCorruption(String, String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Concurrency violation: {0}")]
    ConcurrencyViolation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl<T> From<std::sync::PoisonError<T>> for CoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::ConcurrencyViolation(err.to_string())
    }
}
