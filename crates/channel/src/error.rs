//! Channel error types.

use std::io;

/// Errors produced while running a remote command.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to launch '{program}': {source}")]
    Spawn { program: String, source: io::Error },

    #[error("stream I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("remote command failed ({status}): {stderr}")]
    Exit { status: String, stderr: String },

    #[error("cancelled")]
    Cancelled,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid launcher configuration: {0}")]
    InvalidConfig(String),
}

impl ChannelError {
    /// Remote stderr captured for a failed command, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Exit { stderr, .. } if !stderr.is_empty() => Some(stderr),
            _ => None,
        }
    }
}
