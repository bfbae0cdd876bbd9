//! Upload, download and exec entry points.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use execcp_archive::{
    ArchiveError, BuildSummary, ExtractSummary, base_name, clean_path, parent_dir, sanitize,
    strip_leading_slash,
};
use execcp_channel::{
    CaptureBuffer, ChannelError, ExecChannel, ExecTarget, StreamOptions, TargetResolver,
};
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::probe::classify_remote;
use crate::remote::{tar_create_command, tar_extract_command};
use crate::temp::TempArchive;
use crate::{PIPE_CAPACITY, TransferError};

/// Local-side settings for transfers.
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Directory for temporary upload archives; the system default if unset.
    pub temp_dir: Option<PathBuf>,
}

/// Result of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    /// Remote path the source was written to.
    pub destination: String,
    pub archive: BuildSummary,
}

/// Result of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Local path the remote source was written to.
    pub destination: PathBuf,
    pub archive: ExtractSummary,
}

/// Captured output of a remote command, trimmed of surrounding whitespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Copies files and directory trees to and from remote execution targets.
///
/// Holds no per-transfer state; one client can serve any number of
/// concurrent operations against different targets. Concurrent operations
/// on the same remote or local path are not coordinated.
pub struct TransferClient {
    channel: Arc<dyn ExecChannel>,
    resolver: Arc<dyn TargetResolver>,
    options: TransferOptions,
}

impl TransferClient {
    pub fn new(
        channel: Arc<dyn ExecChannel>,
        resolver: Arc<dyn TargetResolver>,
        options: TransferOptions,
    ) -> Self {
        Self {
            channel,
            resolver,
            options,
        }
    }

    /// Builds a client from one backend that both runs and resolves.
    pub fn from_backend<B>(backend: Arc<B>, options: TransferOptions) -> Self
    where
        B: ExecChannel + TargetResolver + 'static,
    {
        Self::new(backend.clone(), backend, options)
    }

    /// Copies the local file or directory `local` to `remote` inside `target`.
    ///
    /// If `remote` is an existing remote directory the source lands inside
    /// it under its own name; otherwise the source is written as `remote`.
    /// The archive is staged in a temporary local file that is removed on
    /// every exit path.
    pub async fn upload(
        &self,
        target: &ExecTarget,
        local: &Path,
        remote: &str,
        cancel: CancellationToken,
    ) -> Result<UploadSummary, TransferError> {
        check_cancelled(&cancel)?;

        tokio::fs::metadata(local)
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => TransferError::SourceNotFound(local.to_path_buf()),
                _ => TransferError::LocalIo {
                    path: local.to_path_buf(),
                    source: e,
                },
            })?;

        self.validate_target(target, &cancel).await?;

        if remote.is_empty() {
            return Err(TransferError::InvalidPath("remote path is empty".into()));
        }
        let remote = trim_trailing_slash(remote);
        let source_name = local_name(local).await?;

        let classification =
            classify_remote(self.channel.as_ref(), target, remote, cancel.clone()).await?;
        let destination = if classification.is_directory {
            join_remote(remote, &source_name)
        } else {
            remote.to_string()
        };
        let entry_root = base_name(&destination).to_string();
        let extract_dir = parent_dir(&destination);

        debug!(
            %target,
            local = %local.display(),
            destination = %destination,
            exists = classification.exists,
            is_directory = classification.is_directory,
            "building upload archive"
        );

        let source = local.to_path_buf();
        let temp_dir = self.options.temp_dir.clone();
        let (archive, built) = tokio::task::spawn_blocking(move || {
            let mut archive = TempArchive::create(&source, temp_dir.as_deref())?;
            let built = archive.write_archive(&source, &entry_root)?;
            Ok::<_, TransferError>((archive, built))
        })
        .await
        .map_err(|e| TransferError::Task(e.to_string()))??;

        check_cancelled(&cancel)?;

        let stdin = archive.open().await?;
        let command = tar_extract_command(&extract_dir);
        self.channel
            .stream(target, &command, StreamOptions::new().stdin(stdin), cancel)
            .await
            .map_err(|e| TransferError::channel("upload", e))?;

        drop(archive);
        info!(
            %target,
            destination = %destination,
            entries = built.entries,
            bytes = built.bytes,
            "upload complete"
        );

        Ok(UploadSummary {
            destination,
            archive: built,
        })
    }

    /// Copies the remote file or directory `remote` from `target` into `local`.
    ///
    /// The source lands at `local/<basename of remote>`. Remote output is
    /// extracted as it arrives; if extraction fails the remote command is
    /// torn down and the extraction error is reported, unless the remote
    /// command failed on its own and cut a file short. Files already
    /// written are left in place.
    pub async fn download(
        &self,
        target: &ExecTarget,
        remote: &str,
        local: &Path,
        cancel: CancellationToken,
    ) -> Result<DownloadSummary, TransferError> {
        check_cancelled(&cancel)?;
        self.validate_target(target, &cancel).await?;

        if remote.is_empty() {
            return Err(TransferError::InvalidPath("remote path is empty".into()));
        }

        let prefix = sanitize(strip_leading_slash(&clean_path(remote)));
        let destination = if prefix.is_empty() {
            local.to_path_buf()
        } else {
            local.join(base_name(&prefix))
        };

        debug!(
            %target,
            remote,
            prefix = %prefix,
            destination = %destination.display(),
            "starting download"
        );

        let (reader, writer) = tokio::io::duplex(PIPE_CAPACITY);
        let abort = cancel.child_token();

        let extraction = {
            let mut bridge = SyncIoBridge::new(reader);
            let root = destination.clone();
            let abort = abort.clone();
            tokio::task::spawn_blocking(move || {
                let result = execcp_archive::extract(&mut bridge, &root, &prefix);
                match &result {
                    // Keep reading trailing padding so the remote side never blocks.
                    Ok(_) => {
                        if let Err(e) = io::copy(&mut bridge, &mut io::sink()) {
                            debug!(error = %e, "draining archive trailer failed");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "extraction failed, aborting remote command");
                        abort.cancel();
                    }
                }
                result
            })
        };

        let command = tar_create_command(remote);
        let streamed = self
            .channel
            .stream(target, &command, StreamOptions::new().stdout(writer), abort.clone())
            .await;
        let extracted = extraction
            .await
            .map_err(|e| TransferError::Task(e.to_string()))?;

        let archive = match (streamed, extracted) {
            // A stream cut short by a failing remote command reports the remote error.
            (Err(e @ ChannelError::Exit { .. }), Err(ArchiveError::Stream(_))) => {
                return Err(TransferError::channel("download", e));
            }
            (_, Err(e)) if abort.is_cancelled() && !cancel.is_cancelled() => return Err(e.into()),
            (Err(e), _) => return Err(TransferError::channel("download", e)),
            (Ok(()), extracted) => extracted?,
        };

        info!(
            %target,
            destination = %destination.display(),
            files = archive.files,
            directories = archive.directories,
            bytes = archive.bytes,
            "download complete"
        );

        Ok(DownloadSummary {
            destination,
            archive,
        })
    }

    /// Runs `command` inside `target` and returns its captured output.
    pub async fn exec(
        &self,
        target: &ExecTarget,
        command: &[String],
        cancel: CancellationToken,
    ) -> Result<ExecOutput, TransferError> {
        check_cancelled(&cancel)?;
        if command.is_empty() {
            return Err(TransferError::EmptyCommand);
        }
        self.validate_target(target, &cancel).await?;

        let stdout = CaptureBuffer::new();
        let stderr = CaptureBuffer::new();
        let streams = StreamOptions::new()
            .stdout(stdout.clone())
            .stderr(stderr.clone());

        self.channel
            .stream(target, command, streams, cancel)
            .await
            .map_err(|e| TransferError::channel("exec", e))?;

        Ok(ExecOutput {
            stdout: stdout.to_string_lossy().trim().to_string(),
            stderr: stderr.to_string_lossy().trim().to_string(),
        })
    }

    /// Confirms the target context exists and exposes the named sub-target.
    async fn validate_target(
        &self,
        target: &ExecTarget,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let listed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            result = self.resolver.sub_targets(&target.context) => result,
        };

        let sub_targets = match listed {
            Ok(sub_targets) => sub_targets,
            Err(ChannelError::Cancelled) => return Err(TransferError::Cancelled),
            Err(ChannelError::InvalidConfig(reason)) => {
                debug!(%target, %reason, "target validation unavailable, skipping");
                return Ok(());
            }
            Err(e) => {
                return Err(TransferError::TargetNotFound {
                    name: target.context.clone(),
                    reason: e.to_string(),
                });
            }
        };

        if let Some(sub) = &target.sub_target {
            if !sub_targets.iter().any(|s| s == sub) {
                return Err(TransferError::TargetNotFound {
                    name: target.to_string(),
                    reason: format!("{} has no sub-target '{sub}'", target.context),
                });
            }
        }
        Ok(())
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), TransferError> {
    if cancel.is_cancelled() {
        Err(TransferError::Cancelled)
    } else {
        Ok(())
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(rest) if !rest.is_empty() => rest,
        _ => path,
    }
}

fn join_remote(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Name the local source carries on the remote side.
async fn local_name(local: &Path) -> Result<String, TransferError> {
    if let Some(name) = local.file_name() {
        return Ok(name.to_string_lossy().into_owned());
    }

    let resolved = tokio::fs::canonicalize(local)
        .await
        .map_err(|source| TransferError::LocalIo {
            path: local.to_path_buf(),
            source,
        })?;
    resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            TransferError::InvalidPath(format!("cannot name upload source {}", local.display()))
        })
}
