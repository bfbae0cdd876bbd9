//! Error types for archive building and extraction.

use std::io;
use std::path::{Path, PathBuf};

/// Errors produced while building or extracting a tar stream.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("I/O error at {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("archive stream error: {0}")]
    Stream(#[from] io::Error),

    #[error("tar contents corrupted: {0}")]
    Corrupt(String),

    #[error("cannot name archive entry for {}", .0.display())]
    UnnamedEntry(PathBuf),
}

impl ArchiveError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
