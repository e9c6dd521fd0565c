//! Error types for cache operations.

use std::path::PathBuf;

use kiln_persist::PersistError;

/// Errors that can occur during cache operations.
///
/// A missing, outdated, or damaged graph is not an error: those are reported
/// through [`CacheLoad`](crate::CacheLoad) so the caller falls back to a full
/// build. This enum covers failures the caller has to see.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while managing cache files.
    #[error("cache I/O error at {}: {source}", path.display())]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The build graph could not be written or read.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = CacheError::Io {
            path: PathBuf::from("/tmp/cache/build-graph.bin"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("cache I/O error"));
        assert!(msg.contains("build-graph.bin"));
    }

    #[test]
    fn persist_error_is_transparent() {
        let err = CacheError::from(PersistError::NotOpen { expected: "reading" });
        assert_eq!(
            err.to_string(),
            PersistError::NotOpen { expected: "reading" }.to_string()
        );
    }
}
