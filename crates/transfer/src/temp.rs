//! Temporary local archive for one upload.

use std::io::BufWriter;
use std::path::Path;

use execcp_archive::BuildSummary;
use tempfile::NamedTempFile;

use crate::TransferError;

/// A tar file on local disk that is deleted when dropped.
///
/// Named `<stem>-<random>.tar` after the upload source, in the configured
/// directory or the system temp directory. Each upload gets a fresh name.
#[derive(Debug)]
pub struct TempArchive {
    file: NamedTempFile,
}

impl TempArchive {
    /// Creates an empty archive file for `source`.
    pub fn create(source: &Path, dir: Option<&Path>) -> Result<Self, TransferError> {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "upload".into());
        let prefix = format!("{stem}-");

        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(".tar");
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|source| TransferError::LocalIo {
            path: dir.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            source,
        })?;

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Writes `source` into the file as a tar stream rooted at `entry_root`.
    pub fn write_archive(
        &mut self,
        source: &Path,
        entry_root: &str,
    ) -> Result<BuildSummary, TransferError> {
        let writer = BufWriter::new(self.file.as_file_mut());
        Ok(execcp_archive::build_with_root(source, entry_root, writer)?)
    }

    /// Opens an independent read handle positioned at the start.
    pub async fn open(&self) -> Result<tokio::fs::File, TransferError> {
        tokio::fs::File::open(self.path())
            .await
            .map_err(|source| TransferError::LocalIo {
                path: self.path().to_path_buf(),
                source,
            })
    }
}
