//! Error types for treesize
//!
//! Failures are always scoped to the entry or subtree that produced them:
//! - Walk errors (unreadable directories, entries that vanished mid-walk)
//! - Metadata reads for a single path
//! - Positional misuse of an ordered collection
//!
//! Cancellation is not an error and has no variant here.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the tree engine
#[derive(Error, Debug)]
pub enum TreeError {
    /// Error reported by the directory walker
    #[error("Walk error: {0}")]
    Walk(#[from] jwalk::Error),

    /// I/O error on a specific path
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Index outside the bounds of an ordered collection
    #[error("Index {index} out of bounds for collection of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A directory-only operation was requested on a file
    #[error("Not a directory: '{0}'")]
    NotADirectory(PathBuf),

    /// The worker pool for a tree could not be started
    #[error("Failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl TreeError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TreeError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this is an inaccessible-entry error: permission denied, a
    /// broken link, or an entry that was deleted or moved during the walk.
    pub fn is_inaccessible(&self) -> bool {
        match self {
            TreeError::Walk(_) => true,
            TreeError::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::PermissionDenied
                    | io::ErrorKind::NotFound
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::InvalidData
                    | io::ErrorKind::Other
            ),
            TreeError::IndexOutOfBounds { .. }
            | TreeError::NotADirectory(_)
            | TreeError::Pool(_) => false,
        }
    }
}

/// Result type alias using TreeError
pub type Result<T> = std::result::Result<T, TreeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inaccessible_classification() {
        let denied = TreeError::io("/x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(denied.is_inaccessible());

        let gone = TreeError::io("/x", io::Error::from(io::ErrorKind::NotFound));
        assert!(gone.is_inaccessible());

        let misuse = TreeError::IndexOutOfBounds { index: 3, len: 1 };
        assert!(!misuse.is_inaccessible());
    }

    #[test]
    fn test_error_display() {
        let err = TreeError::IndexOutOfBounds { index: 5, len: 2 };
        assert_eq!(
            err.to_string(),
            "Index 5 out of bounds for collection of length 2"
        );
        let err = TreeError::NotADirectory(PathBuf::from("/a/b.txt"));
        assert_eq!(err.to_string(), "Not a directory: '/a/b.txt'");
    }
}
