//! Remote command channel.
//!
//! A channel runs one command inside a remote execution target and exchanges
//! raw bytes with it over stdin, stdout and stderr. Nothing else is assumed of
//! the remote side. The transfer layer is written against the
//! [`ExecChannel`] and [`TargetResolver`] traits so it can be driven by any
//! backend, including in-process fakes.
//!
//! [`CommandChannel`] is the stock backend: it spawns a local launcher
//! process (`kubectl exec` by default) described by a [`LauncherConfig`].

pub mod capture;
pub mod command;
pub mod error;
pub mod exec;
pub mod launcher;

pub use capture::CaptureBuffer;
pub use command::CommandChannel;
pub use error::ChannelError;
pub use exec::{
    BoxedReader, BoxedWriter, ChannelFuture, ExecChannel, ExecTarget, StreamOptions,
    TargetResolver,
};
pub use launcher::LauncherConfig;
