//! Tar stream construction from a local file or directory tree.
//!
//! Walks the tree depth-first in lexical order and emits one record per
//! node. Regular files carry their bytes, directories carry nothing, and
//! symlinks are forwarded as opaque link records (target only, never
//! followed). Devices, sockets and FIFOs are skipped.

use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::{Component, Path};

use tar::{EntryType, Header, HeaderMode};
use tracing::debug;

use crate::ArchiveError;
use crate::sanitize::{clean_path, sanitize};

/// Totals for one built archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Records written (directories, files and links).
    pub entries: usize,
    /// Payload bytes of regular files.
    pub bytes: u64,
}

/// Writes `source` as a tar stream into `writer`.
///
/// Each record is named by the node's path below the filesystem root, so
/// `/srv/app/conf.yml` becomes `srv/app/conf.yml`. Relative sources are
/// made absolute against the current directory first.
pub fn build<W: Write>(source: &Path, writer: W) -> Result<BuildSummary, ArchiveError> {
    let absolute = std::path::absolute(source).map_err(|e| ArchiveError::io(source, e))?;
    let root = root_relative_name(&absolute);
    build_with_root(source, &root, writer)
}

/// Writes `source` as a tar stream whose top record is named `entry_root`.
///
/// Descendants are named `entry_root/<path below source>`. The root name is
/// cleaned and sanitized, so it can never introduce `..` or an absolute
/// path into the archive.
pub fn build_with_root<W: Write>(
    source: &Path,
    entry_root: &str,
    writer: W,
) -> Result<BuildSummary, ArchiveError> {
    let root = sanitize(&clean_path(entry_root));
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);

    let mut summary = BuildSummary::default();
    append_node(&mut builder, source, Path::new(&root), &mut summary)?;

    let mut writer = builder.into_inner().map_err(ArchiveError::Stream)?;
    writer.flush().map_err(ArchiveError::Stream)?;

    debug!(
        source = %source.display(),
        root = %root,
        entries = summary.entries,
        bytes = summary.bytes,
        "archive built"
    );
    Ok(summary)
}

fn append_node<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &Path,
    name: &Path,
    summary: &mut BuildSummary,
) -> Result<(), ArchiveError> {
    let metadata = fs::symlink_metadata(path).map_err(|e| ArchiveError::io(path, e))?;
    let file_type = metadata.file_type();

    if file_type.is_dir() {
        // The filesystem root itself has no name; only its children are recorded.
        if !name.as_os_str().is_empty() {
            let mut header = header_for(&metadata, EntryType::Directory);
            builder
                .append_data(&mut header, name, io::empty())
                .map_err(|e| ArchiveError::io(path, e))?;
            summary.entries += 1;
        }

        let mut children = fs::read_dir(path)
            .and_then(|entries| entries.collect::<Result<Vec<_>, _>>())
            .map_err(|e| ArchiveError::io(path, e))?;
        children.sort_by_key(|entry| entry.file_name());

        for child in children {
            // Joined as a path so names that are not UTF-8 keep their bytes.
            let child_name = name.join(child.file_name());
            append_node(builder, &child.path(), &child_name, summary)?;
        }
        return Ok(());
    }

    if name.as_os_str().is_empty() {
        return Err(ArchiveError::UnnamedEntry(path.to_path_buf()));
    }

    if file_type.is_file() {
        let file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
        let mut header = header_for(&metadata, EntryType::Regular);
        header.set_size(metadata.len());
        builder
            .append_data(&mut header, name, file.take(metadata.len()))
            .map_err(|e| ArchiveError::io(path, e))?;
        summary.bytes += metadata.len();
    } else if file_type.is_symlink() {
        let target = fs::read_link(path).map_err(|e| ArchiveError::io(path, e))?;
        let mut header = header_for(&metadata, EntryType::Symlink);
        builder
            .append_link(&mut header, name, &target)
            .map_err(|e| ArchiveError::io(path, e))?;
    } else {
        debug!(path = %path.display(), "skipping special file");
        return Ok(());
    }

    summary.entries += 1;
    Ok(())
}

fn header_for(metadata: &Metadata, kind: EntryType) -> Header {
    let mut header = Header::new_gnu();
    header.set_metadata_in_mode(metadata, HeaderMode::Complete);
    header.set_entry_type(kind);
    header.set_mode(permission_bits(metadata));
    if kind != EntryType::Regular {
        header.set_size(0);
    }
    header
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    match (metadata.is_dir(), metadata.permissions().readonly()) {
        (true, _) => 0o755,
        (false, true) => 0o444,
        (false, false) => 0o644,
    }
}

/// Path below the filesystem root, `/`-separated, without drive or root.
fn root_relative_name(path: &Path) -> String {
    let segments: Vec<String> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".into()),
            Component::Prefix(_) | Component::RootDir | Component::CurDir => None,
        })
        .collect();
    sanitize(&clean_path(&segments.join("/")))
}
