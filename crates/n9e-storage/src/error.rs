use n9e_common::error::{DeadlineExceeded, ErrorKind, ValidationError};
use sea_orm::{DbErr, SqlErr};

/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use n9e_common::error::ErrorKind;
/// use n9e_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "alert_mute",
///     id: "99".to_string(),
/// };
/// assert!(err.to_string().contains("alert_mute"));
/// assert_eq!(err.kind(), ErrorKind::Validation);
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// Input rejected before touching the database.
    #[error("Storage: {0}")]
    Validation(#[from] ValidationError),

    /// Another writer inserted a current row for the same hash.
    #[error("Storage: current event for hash {hash} already exists")]
    Conflict { hash: String },

    /// Persisted state contradicts the event invariants.
    #[error("Storage: invariant broken: {0}")]
    Invariant(String),

    /// The caller's deadline passed before the next I/O step.
    #[error("Storage: {0}")]
    Deadline(#[from] DeadlineExceeded),

    /// An underlying database error.
    #[error("Storage: database error: {0}")]
    Database(#[from] DbErr),

    /// JSON serialization or deserialization failure (e.g. `tags` columns).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound { .. } | StorageError::Validation(_) | StorageError::Json(_) => {
                ErrorKind::Validation
            }
            StorageError::Conflict { .. } => ErrorKind::Conflict,
            StorageError::Invariant(_) => ErrorKind::Fatal,
            StorageError::Deadline(_) => ErrorKind::Transient,
            StorageError::Database(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => ErrorKind::Conflict,
                _ => ErrorKind::Transient,
            },
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind().is_retriable()
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
