//! Prefix-checked tar extraction.
//!
//! Every entry name must start with the caller's prefix; the prefix is
//! stripped and the remainder joined under the destination root. Entries
//! that do not match the prefix, or whose remainder could resolve outside
//! the root, abort the whole extraction. Files written before the failure
//! are left in place.

use std::cell::Cell;
use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ArchiveError;
use crate::sanitize::check_entry_path;

/// Totals for one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Entries read from the stream, including skipped ones.
    pub entries: usize,
    pub files: usize,
    pub directories: usize,
    /// Links and special records, which are never materialized.
    pub skipped: usize,
    /// Payload bytes written to regular files.
    pub bytes: u64,
}

/// Extracts a tar stream under `destination`, rebasing names past `prefix`.
///
/// An entry named exactly `prefix` maps to `destination` itself; an entry
/// named `prefix/rest` maps to `destination/rest`. With an empty prefix the
/// full entry name is used. Directories and regular files are created with
/// their recorded permission bits; other record kinds are skipped. Directory
/// bits are applied once every entry is written, so a read-only directory
/// still receives its children.
///
/// The stream ending between records ends the extraction successfully. A
/// file whose contents are cut short fails with `UnexpectedEof`.
pub fn extract<R: Read>(
    reader: R,
    destination: &Path,
    prefix: &str,
) -> Result<ExtractSummary, ArchiveError> {
    let hit_eof = Cell::new(false);
    let mut archive = tar::Archive::new(EofAware {
        inner: reader,
        hit_eof: &hit_eof,
    });
    let mut summary = ExtractSummary::default();
    let mut directory_modes = Vec::new();

    for entry in archive.entries().map_err(ArchiveError::Stream)? {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) if hit_eof.get() || e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!(error = %e, "archive stream truncated, stopping");
                break;
            }
            Err(e) => return Err(ArchiveError::Corrupt(format!("unreadable header: {e}"))),
        };

        let name_bytes = entry.path_bytes().into_owned();
        let name = String::from_utf8_lossy(&name_bytes).into_owned();
        let relative = entry_path(strip_entry_prefix(&name_bytes, prefix, &name)?);
        check_entry_path(&name, &relative)?;

        let target = if relative.as_os_str().is_empty() {
            destination.to_path_buf()
        } else {
            destination.join(&relative)
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
        }

        let kind = entry.header().entry_type();
        let mode = entry.header().mode().unwrap_or(0o644) & 0o7777;
        summary.entries += 1;

        if kind.is_dir() {
            fs::create_dir_all(&target).map_err(|e| ArchiveError::io(&target, e))?;
            directory_modes.push((target, mode));
            summary.directories += 1;
        } else if kind.is_file() {
            let expected = entry.size();
            let written = write_file(&mut entry, &target, mode)?;
            if written != expected {
                return Err(ArchiveError::Stream(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("entry '{name}' truncated after {written} of {expected} bytes"),
                )));
            }
            summary.bytes += written;
            summary.files += 1;
        } else {
            debug!(entry = %name, kind = ?kind, "skipping non-regular entry");
            summary.skipped += 1;
        }
    }

    // Deepest first, so a parent losing write access cannot block a child.
    for (directory, mode) in directory_modes.iter().rev() {
        set_mode(directory, *mode)?;
    }

    debug!(
        destination = %destination.display(),
        entries = summary.entries,
        bytes = summary.bytes,
        "archive extracted"
    );
    Ok(summary)
}

/// Returns the part of `name` below `prefix`, or fails if it lies elsewhere.
///
/// `shown` is the printable form of `name` used in errors.
fn strip_entry_prefix<'a>(
    name: &'a [u8],
    prefix: &str,
    shown: &str,
) -> Result<&'a [u8], ArchiveError> {
    if prefix.is_empty() {
        return Ok(name);
    }

    let unexpected = || ArchiveError::Corrupt(format!("entry '{shown}' is not under '{prefix}'"));
    let rest = name.strip_prefix(prefix.as_bytes()).ok_or_else(unexpected)?;
    if rest.is_empty() {
        return Ok(rest);
    }
    rest.strip_prefix(b"/").ok_or_else(unexpected)
}

#[cfg(unix)]
fn entry_path(name: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(name))
}

#[cfg(not(unix))]
fn entry_path(name: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(name).into_owned())
}

fn write_file<R: Read>(entry: &mut R, target: &Path, mode: u32) -> Result<u64, ArchiveError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }

    let mut file = options
        .open(target)
        .map_err(|e| ArchiveError::io(target, e))?;
    let written = io::copy(entry, &mut file).map_err(|e| ArchiveError::io(target, e))?;

    // The open mode is filtered by the umask; restore the recorded bits.
    set_mode(target, mode)?;
    Ok(written)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), ArchiveError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| ArchiveError::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), ArchiveError> {
    Ok(())
}

/// Remembers whether the underlying reader has reported end of stream.
struct EofAware<'a, R> {
    inner: R,
    hit_eof: &'a Cell<bool>,
}

impl<R: Read> Read for EofAware<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.hit_eof.set(true);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_with_root;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn file_record(builder: &mut tar::Builder<&mut Vec<u8>>, name: &str, data: &[u8], mode: u32) {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, name, data).unwrap();
    }

    fn dir_record(builder: &mut tar::Builder<&mut Vec<u8>>, name: &str) {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Directory);
        builder.append_data(&mut header, name, io::empty()).unwrap();
    }

    /// Writes a record with a raw name, bypassing the builder's path checks.
    fn raw_file_record(builder: &mut tar::Builder<&mut Vec<u8>>, name: &[u8], data: &[u8]) {
        let mut header = tar::Header::new_old();
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }

    fn archive_with(fill: impl FnOnce(&mut tar::Builder<&mut Vec<u8>>)) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut out);
            fill(&mut builder);
            builder.finish().unwrap();
        }
        out
    }

    #[test]
    fn extract_rebases_past_prefix() {
        let data = archive_with(|b| {
            dir_record(b, "data/uploaddir");
            file_record(b, "data/uploaddir/one.txt", b"ONE", 0o644);
            file_record(b, "data/uploaddir/sub/two.txt", b"TWO", 0o644);
        });
        let out = TempDir::new().unwrap();
        let root = out.path().join("uploaddir");

        let summary = extract(Cursor::new(data), &root, "data/uploaddir").unwrap();

        assert_eq!(summary.directories, 1);
        assert_eq!(summary.files, 2);
        assert_eq!(summary.bytes, 6);
        assert_eq!(fs::read(root.join("one.txt")).unwrap(), b"ONE");
        assert_eq!(fs::read(root.join("sub").join("two.txt")).unwrap(), b"TWO");
    }

    #[test]
    fn extract_single_file_matching_prefix_exactly() {
        let data = archive_with(|b| file_record(b, "data/upload.txt", b"HELLO", 0o644));
        let out = TempDir::new().unwrap();
        let target = out.path().join("upload.txt");

        extract(Cursor::new(data), &target, "data/upload.txt").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"HELLO");
    }

    #[test]
    fn extract_rejects_entry_outside_prefix() {
        let data = archive_with(|b| file_record(b, "other/file.txt", b"X", 0o644));
        let out = TempDir::new().unwrap();

        let result = extract(Cursor::new(data), out.path(), "data");
        assert!(matches!(result, Err(ArchiveError::Corrupt(_))));
        assert!(!out.path().join("file.txt").exists());
    }

    #[test]
    fn extract_prefix_requires_segment_boundary() {
        let data = archive_with(|b| file_record(b, "data/uploaddir2/x", b"X", 0o644));
        let out = TempDir::new().unwrap();

        let result = extract(Cursor::new(data), out.path(), "data/uploaddir");
        assert!(matches!(result, Err(ArchiveError::Corrupt(_))));
    }

    #[test]
    fn extract_rejects_parent_traversal() {
        let data = archive_with(|b| raw_file_record(b, b"../../evil", b"EVIL"));
        let base = TempDir::new().unwrap();
        let destination = base.path().join("a").join("b");
        fs::create_dir_all(&destination).unwrap();

        let result = extract(Cursor::new(data), &destination, "");

        assert!(matches!(result, Err(ArchiveError::Corrupt(_))));
        assert!(!base.path().join("evil").exists());
        assert!(!base.path().join("a").join("evil").exists());
    }

    #[test]
    fn extract_rejects_absolute_entry_without_prefix() {
        let data = archive_with(|b| raw_file_record(b, b"/tmp/evil-absolute", b"EVIL"));
        let out = TempDir::new().unwrap();

        let result = extract(Cursor::new(data), out.path(), "");
        assert!(matches!(result, Err(ArchiveError::Corrupt(_))));
    }

    #[test]
    fn extract_keeps_files_written_before_failure() {
        let data = archive_with(|b| {
            file_record(b, "data/good.txt", b"GOOD", 0o644);
            file_record(b, "elsewhere/bad.txt", b"BAD", 0o644);
        });
        let out = TempDir::new().unwrap();

        let result = extract(Cursor::new(data), out.path(), "data");
        assert!(result.is_err());
        assert_eq!(fs::read(out.path().join("good.txt")).unwrap(), b"GOOD");
    }

    #[test]
    fn extract_empty_stream_succeeds() {
        let out = TempDir::new().unwrap();
        let summary = extract(Cursor::new(Vec::new()), out.path(), "data").unwrap();
        assert_eq!(summary, ExtractSummary::default());
    }

    #[test]
    fn extract_truncated_stream_stops_cleanly() {
        let data = archive_with(|b| {
            file_record(b, "first.txt", b"FIRST", 0o644);
            file_record(b, "second.txt", &[7u8; 2048], 0o644);
        });
        // First record (512 header + 512 padded payload) plus half a header.
        let truncated = data[..1024 + 256].to_vec();
        let out = TempDir::new().unwrap();

        let summary = extract(Cursor::new(truncated), out.path(), "").unwrap();

        assert_eq!(summary.files, 1);
        assert_eq!(fs::read(out.path().join("first.txt")).unwrap(), b"FIRST");
        assert!(!out.path().join("second.txt").exists());
    }

    #[test]
    fn extract_truncated_file_contents_fail() {
        let data = archive_with(|b| file_record(b, "big.bin", &[9u8; 4096], 0o644));
        let truncated = data[..512 + 1000].to_vec();
        let out = TempDir::new().unwrap();

        let result = extract(Cursor::new(truncated), out.path(), "");

        assert!(matches!(
            result,
            Err(ArchiveError::Stream(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof
        ));
    }

    #[test]
    fn extract_garbage_header_is_corrupt() {
        let out = TempDir::new().unwrap();
        let garbage = vec![0x5Au8; 1024];

        let result = extract(Cursor::new(garbage), out.path(), "");
        assert!(matches!(result, Err(ArchiveError::Corrupt(_))));
    }

    #[test]
    fn extract_overwrites_existing_file() {
        let data = archive_with(|b| file_record(b, "f.txt", b"NEW", 0o644));
        let out = TempDir::new().unwrap();
        fs::write(out.path().join("f.txt"), b"OLD CONTENT THAT IS LONGER").unwrap();

        extract(Cursor::new(data), out.path(), "").unwrap();
        assert_eq!(fs::read(out.path().join("f.txt")).unwrap(), b"NEW");
    }

    #[test]
    fn round_trip_preserves_names_and_contents() {
        let src = TempDir::new().unwrap();
        let tree = src.path().join("tree");
        fs::create_dir_all(tree.join("nested").join("empty")).unwrap();
        fs::write(tree.join("top.txt"), b"top level").unwrap();
        fs::write(tree.join("nested").join("inner.bin"), [0u8, 1, 2, 3, 255]).unwrap();

        let mut data = Vec::new();
        build_with_root(&tree, "tree", &mut data).unwrap();

        let out = TempDir::new().unwrap();
        extract(Cursor::new(data), out.path(), "").unwrap();

        let copy = out.path().join("tree");
        assert_eq!(fs::read(copy.join("top.txt")).unwrap(), b"top level");
        assert_eq!(
            fs::read(copy.join("nested").join("inner.bin")).unwrap(),
            [0u8, 1, 2, 3, 255]
        );
        assert!(copy.join("nested").join("empty").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn round_trip_preserves_permission_bits() {
        use std::os::unix::fs::PermissionsExt;

        let src = TempDir::new().unwrap();
        let tree = src.path().join("tree");
        fs::create_dir_all(tree.join("private")).unwrap();
        fs::create_dir_all(tree.join("sealed")).unwrap();
        fs::write(tree.join("run.sh"), b"#!/bin/sh\n").unwrap();
        fs::write(tree.join("secret"), b"s").unwrap();
        fs::write(tree.join("sealed").join("inside.txt"), b"in").unwrap();
        let chmod =
            |p: &Path, mode: u32| fs::set_permissions(p, fs::Permissions::from_mode(mode)).unwrap();
        chmod(&tree.join("run.sh"), 0o755);
        chmod(&tree.join("secret"), 0o600);
        chmod(&tree.join("private"), 0o700);
        chmod(&tree.join("sealed"), 0o555);

        let mut data = Vec::new();
        build_with_root(&tree, "tree", &mut data).unwrap();
        chmod(&tree.join("sealed"), 0o755);
        let out = TempDir::new().unwrap();
        extract(Cursor::new(data), out.path(), "").unwrap();

        let copy = out.path().join("tree");
        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode(&copy.join("run.sh")), 0o755);
        assert_eq!(mode(&copy.join("secret")), 0o600);
        assert_eq!(mode(&copy.join("private")), 0o700);
        assert_eq!(mode(&copy.join("sealed")), 0o555);
        assert_eq!(fs::read(copy.join("sealed").join("inside.txt")).unwrap(), b"in");
        chmod(&copy.join("sealed"), 0o755);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn round_trip_keeps_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let name = OsStr::from_bytes(b"caf\xe9.txt");
        let src = TempDir::new().unwrap();
        let tree = src.path().join("tree");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join(name), b"LATIN1").unwrap();

        let mut data = Vec::new();
        build_with_root(&tree, "tree", &mut data).unwrap();
        let out = TempDir::new().unwrap();
        extract(Cursor::new(data), out.path(), "tree").unwrap();

        assert_eq!(fs::read(out.path().join(name)).unwrap(), b"LATIN1");
    }

    #[cfg(unix)]
    #[test]
    fn extract_skips_symlink_records() {
        let src = TempDir::new().unwrap();
        let tree = src.path().join("tree");
        fs::create_dir_all(&tree).unwrap();
        fs::write(tree.join("real.txt"), b"R").unwrap();
        std::os::unix::fs::symlink("/etc/passwd", tree.join("link")).unwrap();

        let mut data = Vec::new();
        build_with_root(&tree, "tree", &mut data).unwrap();
        let out = TempDir::new().unwrap();
        let summary = extract(Cursor::new(data), out.path(), "tree").unwrap();

        assert_eq!(summary.skipped, 1);
        assert!(out.path().join("real.txt").exists());
        assert!(fs::symlink_metadata(out.path().join("link")).is_err());
    }
}
