//! Path helpers for `/`-separated remote paths and tar entry names.
//!
//! Remote paths are always POSIX style regardless of the local platform, so
//! these work on strings rather than [`std::path::Path`].

use std::path::{Component, Path};

use crate::ArchiveError;

/// Strips leading `../` segments and leading `/` until neither remains.
///
/// A remainder of exactly `.` or `..` collapses to the empty string. The
/// result never starts with `../` or `/` and is never `.` or `..`, so
/// `sanitize(sanitize(p)) == sanitize(p)` for every input.
pub fn sanitize(path: &str) -> String {
    let mut current = path;
    loop {
        while let Some(rest) = current.strip_prefix("../") {
            current = rest;
        }

        if current == "." || current == ".." {
            return String::new();
        }

        match current.strip_prefix('/') {
            Some(rest) => current = rest,
            None => return current.to_string(),
        }
    }
}

/// Lexically cleans a `/`-separated path.
///
/// Collapses repeated separators, drops `.` segments and resolves `..`
/// against the preceding segment. Leading `..` survive on relative paths and
/// are dropped on rooted ones. An empty result becomes `.`.
pub fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".into();
    }

    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".into()
    } else {
        joined
    }
}

/// Removes every leading `/`.
pub fn strip_leading_slash(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Last segment of a `/`-separated path, ignoring trailing separators.
///
/// Returns `.` for an empty path and `/` for a path made only of separators.
pub fn base_name(path: &str) -> &str {
    if path.is_empty() {
        return ".";
    }

    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }

    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Everything before the last segment, cleaned.
///
/// `a/b` gives `a`, `b` gives `.`, `/b` gives `/`.
pub fn parent_dir(path: &str) -> String {
    let dir = match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "",
    };
    clean_path(dir)
}

/// Rejects a rebased entry path that could resolve outside the destination.
///
/// `entry` is the original tar name, used only for the error message.
pub(crate) fn check_entry_path(entry: &str, relative: &Path) -> Result<(), ArchiveError> {
    for component in relative.components() {
        match component {
            Component::ParentDir => {
                return Err(ArchiveError::Corrupt(format!(
                    "parent directory traversal in entry '{entry}'"
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::Corrupt(format!(
                    "absolute path in entry '{entry}'"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}
