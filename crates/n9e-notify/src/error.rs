use n9e_common::error::ErrorKind;
use n9e_storage::StorageError;

/// Errors that can occur within the notification subsystem.
///
/// # Examples
///
/// ```rust
/// use n9e_notify::error::NotifyError;
///
/// let err = NotifyError::Delivery {
///     channel: "email".to_string(),
///     reason: "smtp timeout".to_string(),
/// };
/// assert!(err.to_string().contains("smtp timeout"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The transport could not hand the intent to its recipient.
    #[error("Notify: delivery on {channel} failed: {reason}")]
    Delivery { channel: String, reason: String },

    /// The channel has no transport behind it.
    #[error("Notify: unknown channel '{0}'")]
    UnknownChannel(String),

    /// Appending a notification record failed.
    #[error("Notify: {0}")]
    Storage(#[from] StorageError),
}

impl NotifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NotifyError::Delivery { .. } => ErrorKind::Transient,
            NotifyError::UnknownChannel(_) => ErrorKind::Validation,
            NotifyError::Storage(e) => e.kind(),
        }
    }
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
