use crate::error::{Result, TreeError};
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Immutable snapshot of one filesystem entry as seen by the walker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryDescriptor {
    pub name: String,
    pub full_path: PathBuf,
    pub is_directory: bool,
    /// Length reported by the filesystem; always `None` for directories.
    pub size_bytes: Option<u64>,
    pub last_write_time: SystemTime,
}

impl EntryDescriptor {
    pub fn from_metadata(path: PathBuf, metadata: &Metadata) -> Self {
        let is_directory = metadata.is_dir();
        Self {
            name: display_name(&path),
            size_bytes: (!is_directory).then(|| metadata.len()),
            last_write_time: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            is_directory,
            full_path: path,
        }
    }

    /// Reads the descriptor of `path` itself, used for the root of a view.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| TreeError::io(path, e))?;
        Ok(Self::from_metadata(path.to_path_buf(), &metadata))
    }

    pub fn file(path: impl Into<PathBuf>, size_bytes: Option<u64>) -> Self {
        let full_path = path.into();
        Self {
            name: display_name(&full_path),
            full_path,
            is_directory: false,
            size_bytes,
            last_write_time: SystemTime::UNIX_EPOCH,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        let full_path = path.into();
        Self {
            name: display_name(&full_path),
            full_path,
            is_directory: true,
            size_bytes: None,
            last_write_time: SystemTime::UNIX_EPOCH,
        }
    }
}

/// Final path component, or the whole path for roots like `/`.
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
