use n9e_common::error::{DeadlineExceeded, ErrorKind, ValidationError};
use n9e_storage::StorageError;

/// Errors returned by the lifecycle engine.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// The evaluation references a rule the registry does not know.
    #[error("Alert: rule {0} not found")]
    RuleNotFound(i64),

    #[error("Alert: {0}")]
    Validation(#[from] ValidationError),

    #[error("Alert: {0}")]
    Storage(#[from] StorageError),

    #[error("Alert: {0}")]
    Deadline(#[from] DeadlineExceeded),

    /// The worker owning the rule has shut down.
    #[error("Alert: engine stopped")]
    EngineStopped,
}

impl AlertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AlertError::RuleNotFound(_) | AlertError::Validation(_) => ErrorKind::Validation,
            AlertError::Storage(e) => e.kind(),
            AlertError::Deadline(_) => ErrorKind::Transient,
            AlertError::EngineStopped => ErrorKind::Fatal,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind().is_retriable()
    }
}

pub type Result<T> = std::result::Result<T, AlertError>;
