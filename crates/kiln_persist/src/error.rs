//! Error types for persistence pool operations.

use std::path::PathBuf;

use kiln_common::InternalError;

/// The result type used throughout the persistence pool.
pub type PersistResult<T> = Result<T, PersistError>;

/// Errors that can occur while storing or loading a build graph.
///
/// Only [`NoBuildGraph`](PersistError::NoBuildGraph) is an expected outcome:
/// it means there is no usable cache and the caller should start from
/// scratch. Everything else aborts the current store or load.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// There is no build graph file to load (missing, empty, or unreadable).
    #[error("no build graph found at {path}")]
    NoBuildGraph {
        /// The path that was opened for reading.
        path: PathBuf,
    },

    /// An I/O error occurred while creating, writing, or flushing the file.
    #[error("build graph I/O error at {path}: {source}")]
    Io {
        /// The file being written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The stream does not contain what the load sequence expects.
    #[error("corrupt build graph at byte {offset}: {reason}")]
    Corrupt {
        /// Byte offset at which the problem was detected.
        offset: u64,
        /// Description of the problem.
        reason: String,
    },

    /// A value cannot be expressed in the stream format.
    #[error("cannot persist value: {reason}")]
    Unrepresentable {
        /// Description of the limitation that was hit.
        reason: String,
    },

    /// The pool has no stream open in the required direction.
    #[error("persistent pool is not open for {expected}")]
    NotOpen {
        /// The direction the operation needed ("reading" or "writing").
        expected: &'static str,
    },

    /// The pool is already bound to a stream.
    #[error("persistent pool is already open")]
    AlreadyOpen,

    /// A section checkpoint did not match what was written.
    #[error("checkpoint mismatch: expected {expected:#010x}, found {found:#010x}")]
    CheckpointMismatch {
        /// Tag of the checkpoint the reader expected.
        expected: u32,
        /// Tag actually present in the stream.
        found: u32,
    },

    /// A broken internal invariant.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl PersistError {
    /// Returns `true` if this error means "no cache, start from scratch".
    pub fn is_no_build_graph(&self) -> bool {
        matches!(self, PersistError::NoBuildGraph { .. })
    }

    /// Returns `true` if the stream content itself was rejected.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            PersistError::Corrupt { .. } | PersistError::CheckpointMismatch { .. }
        )
    }

    pub(crate) fn unrepresentable(reason: impl Into<String>) -> Self {
        PersistError::Unrepresentable {
            reason: reason.into(),
        }
    }
}
