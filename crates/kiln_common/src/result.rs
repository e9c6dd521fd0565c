//! Internal invariant failures.

/// Result of an operation that can only fail if Kiln itself is broken.
///
/// Damaged cache files and bad configuration have their own error types in
/// the crates that detect them; `InternalError` is reserved for bookkeeping
/// that disagrees with itself.
pub type KilnResult<T> = Result<T, InternalError>;

/// A broken internal invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("internal error: {message}")]
pub struct InternalError {
    /// What disagreed with what.
    pub message: String,
}

impl InternalError {
    /// Creates an internal error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
