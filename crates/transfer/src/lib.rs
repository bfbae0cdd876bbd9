//! File and directory copies over a remote command channel.
//!
//! The remote side only runs commands and exchanges bytes, so every copy is
//! framed as a tar stream:
//!
//! - **upload**: local tree -> temporary tar file -> stdin of
//!   `tar -xmf - -C <dir>` on the remote
//! - **download**: stdout of `tar -cf - <path>` on the remote -> streamed
//!   extraction into the local filesystem
//!
//! [`TransferClient`] sequences target validation, the remote directory
//! probe, archive work and channel I/O, and maps every failure into a
//! [`TransferError`].

pub mod client;
pub mod error;
pub mod probe;
pub mod remote;
pub mod temp;

#[cfg(test)]
mod testing;

pub use client::{DownloadSummary, ExecOutput, TransferClient, TransferOptions, UploadSummary};
pub use error::TransferError;
pub use probe::{DestinationClassification, classify_remote, is_remote_directory};
pub use temp::TempArchive;

/// Capacity of the in-memory pipe between the channel and the extractor.
pub const PIPE_CAPACITY: usize = 256 * 1024;
