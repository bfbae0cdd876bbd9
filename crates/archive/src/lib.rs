//! Tar framing for file copies over a remote command channel.
//!
//! The remote side only offers "run a command and exchange bytes", so a tar
//! stream is the sole framing available. This crate produces that stream from
//! a local tree and materializes one back onto disk, refusing entries that
//! would land outside the destination.
//!
//! # Modules
//!
//! - [`sanitize`] - `/`-separated path helpers and the escape-segment sanitizer
//! - `builder` - tar stream construction from a file or directory
//! - `extractor` - prefix-checked tar extraction

mod builder;
mod error;
mod extractor;
pub mod sanitize;

pub use builder::{BuildSummary, build, build_with_root};
pub use error::ArchiveError;
pub use extractor::{ExtractSummary, extract};
pub use sanitize::{base_name, clean_path, parent_dir, sanitize, strip_leading_slash};
