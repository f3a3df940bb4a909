/// Classification shared by every error in the workspace.
///
/// Callers decide whether to retry by looking at the kind rather than the
/// concrete error type.
///
/// # Examples
///
/// ```
/// use n9e_common::error::ErrorKind;
///
/// assert!(ErrorKind::Transient.is_retriable());
/// assert!(ErrorKind::Conflict.is_retriable());
/// assert!(!ErrorKind::Validation.is_retriable());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input rejected; retrying the same input fails again.
    Validation,
    /// I/O failure or deadline exceeded.
    Transient,
    /// Unique constraint on the current table; re-read and retry.
    Conflict,
    /// Invariant broken; no automatic recovery.
    Fatal,
}

impl ErrorKind {
    pub fn is_retriable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Conflict)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Rejected input with a human readable cause.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Validation: {field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Returned by [`crate::time::Deadline::check`] once the deadline passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline exceeded")]
pub struct DeadlineExceeded;
