//! Remote command lines.
//!
//! These are the only commands the transfer layer runs remotely; the remote
//! side must provide a POSIX `tar` and `test`.

/// Writes `path` as a tar stream to stdout.
pub fn tar_create_command(path: &str) -> Vec<String> {
    vec!["tar".into(), "-cf".into(), "-".into(), path.into()]
}

/// Extracts a tar stream from stdin into `dir`, without restoring mtimes.
pub fn tar_extract_command(dir: &str) -> Vec<String> {
    let mut command = vec!["tar".into(), "-xmf".into(), "-".into()];
    if !dir.is_empty() {
        command.push("-C".into());
        command.push(dir.into());
    }
    command
}

/// Exits zero only when `path` is an existing directory.
pub fn test_directory_command(path: &str) -> Vec<String> {
    vec!["test".into(), "-d".into(), path.into()]
}
