//! Transfer error types.

use std::io;
use std::path::PathBuf;

use execcp_archive::ArchiveError;
use execcp_channel::ChannelError;

/// Errors produced by uploads, downloads and remote exec.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("{} doesn't exist in local filesystem", .0.display())]
    SourceNotFound(PathBuf),

    #[error("target {name} not found: {reason}")]
    TargetNotFound { name: String, reason: String },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("empty remote command")]
    EmptyCommand,

    #[error("{op} over remote channel failed: {source}")]
    ChannelFailure {
        op: &'static str,
        source: ChannelError,
    },

    #[error("tar contents corrupted: {0}")]
    ArchiveCorrupt(String),

    #[error("local I/O error at {}: {source}", .path.display())]
    LocalIo { path: PathBuf, source: io::Error },

    #[error("archive error: {0}")]
    Archive(#[source] ArchiveError),

    #[error("cancelled")]
    Cancelled,

    #[error("background task failed: {0}")]
    Task(String),
}

impl TransferError {
    /// Remote stderr captured for a failed channel operation, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::ChannelFailure { source, .. } => source.stderr(),
            _ => None,
        }
    }

    /// Maps a channel error from operation `op`, keeping cancellation distinct.
    pub(crate) fn channel(op: &'static str, source: ChannelError) -> Self {
        match source {
            ChannelError::Cancelled => Self::Cancelled,
            source => Self::ChannelFailure { op, source },
        }
    }
}

impl From<ArchiveError> for TransferError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Corrupt(reason) => Self::ArchiveCorrupt(reason),
            ArchiveError::Io { path, source } => Self::LocalIo { path, source },
            other => Self::Archive(other),
        }
    }
}
