//! Channel traits and the values passed through them.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::ChannelError;

/// Byte source fed to a remote command's stdin.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Byte sink receiving a remote command's stdout or stderr.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Boxed future returned by channel trait methods.
pub type ChannelFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ChannelError>> + Send + 'a>>;

/// Where a remote command runs.
///
/// `context` names the execution context (a pod, a host, a working
/// directory for local launchers). `sub_target` optionally selects one
/// member inside it (a container); `None` leaves the choice to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTarget {
    pub context: String,
    pub sub_target: Option<String>,
}

impl ExecTarget {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            sub_target: None,
        }
    }

    pub fn with_sub_target(mut self, sub_target: impl Into<String>) -> Self {
        self.sub_target = Some(sub_target.into());
        self
    }
}

impl fmt::Display for ExecTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sub_target {
            Some(sub) => write!(f, "{}/{}", self.context, sub),
            None => f.write_str(&self.context),
        }
    }
}

/// Stream wiring for one remote command.
///
/// A missing stdin gives the remote command an empty input. A missing
/// stdout sink discards its output. Stderr is always collected for error
/// reporting and additionally copied into the sink when one is given.
#[derive(Default)]
pub struct StreamOptions {
    pub stdin: Option<BoxedReader>,
    pub stdout: Option<BoxedWriter>,
    pub stderr: Option<BoxedWriter>,
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stdin(mut self, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stdin = Some(Box::new(reader));
        self
    }

    pub fn stdout(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdout = Some(Box::new(writer));
        self
    }

    pub fn stderr(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(writer));
        self
    }
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

/// Runs commands inside a remote execution target.
pub trait ExecChannel: Send + Sync {
    /// Runs `command` in `target` to completion, wiring the given streams.
    ///
    /// Resolves once the remote command has exited and every stream has
    /// been drained. A non-zero exit yields [`ChannelError::Exit`] with the
    /// captured stderr; cancelling `cancel` aborts the command and yields
    /// [`ChannelError::Cancelled`].
    fn stream<'a>(
        &'a self,
        target: &'a ExecTarget,
        command: &'a [String],
        streams: StreamOptions,
        cancel: CancellationToken,
    ) -> ChannelFuture<'a, ()>;
}

/// Confirms that an execution target exists before a channel is opened.
pub trait TargetResolver: Send + Sync {
    /// Lists the sub-targets of `context`.
    ///
    /// Fails with [`ChannelError::NotFound`] when the context itself does
    /// not exist.
    fn sub_targets<'a>(&'a self, context: &'a str) -> ChannelFuture<'a, Vec<String>>;
}
