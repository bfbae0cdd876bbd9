//! Remote directory probe.

use execcp_channel::{ChannelError, ExecChannel, ExecTarget, StreamOptions};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::TransferError;
use crate::remote::test_directory_command;

/// What the probe learned about a remote path.
///
/// A directory test cannot tell a missing path from a regular file, so
/// `exists` is only ever confirmed together with `is_directory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestinationClassification {
    pub exists: bool,
    pub is_directory: bool,
}

impl DestinationClassification {
    pub const DIRECTORY: Self = Self {
        exists: true,
        is_directory: true,
    };

    pub const NOT_DIRECTORY: Self = Self {
        exists: false,
        is_directory: false,
    };
}

/// Runs `test -d <path>` on the remote.
///
/// Succeeds only when the command exits zero. Any error, including a
/// channel failure, means the path is not known to be a directory.
pub async fn is_remote_directory(
    channel: &dyn ExecChannel,
    target: &ExecTarget,
    path: &str,
    cancel: CancellationToken,
) -> Result<(), ChannelError> {
    let command = test_directory_command(path);
    channel
        .stream(target, &command, StreamOptions::new(), cancel)
        .await
}

/// Classifies `path` for the upload destination decision.
///
/// Only cancellation is reported as an error.
pub async fn classify_remote(
    channel: &dyn ExecChannel,
    target: &ExecTarget,
    path: &str,
    cancel: CancellationToken,
) -> Result<DestinationClassification, TransferError> {
    match is_remote_directory(channel, target, path, cancel).await {
        Ok(()) => {
            debug!(%target, path, "remote path is a directory");
            Ok(DestinationClassification::DIRECTORY)
        }
        Err(ChannelError::Cancelled) => Err(TransferError::Cancelled),
        Err(e) => {
            debug!(%target, path, error = %e, "remote path is not a directory");
            Ok(DestinationClassification::NOT_DIRECTORY)
        }
    }
}
