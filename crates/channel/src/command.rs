//! Channel backed by a local launcher process.

use std::io;
use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    BoxedReader, BoxedWriter, ChannelError, ChannelFuture, ExecChannel, ExecTarget,
    LauncherConfig, StreamOptions, TargetResolver,
};

/// Bytes of remote stderr kept for error reports.
const STDERR_TAIL: usize = 64 * 1024;

const STDERR_CHUNK: usize = 8 * 1024;

/// Runs remote commands by spawning the configured launcher program.
///
/// The launcher's own stdin, stdout and stderr are the remote command's
/// streams. Dropping or cancelling a running command kills the launcher.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    config: LauncherConfig,
}

impl CommandChannel {
    pub fn new(config: LauncherConfig) -> Result<Self, ChannelError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    async fn run(
        &self,
        target: &ExecTarget,
        command: &[String],
        streams: StreamOptions,
        cancel: CancellationToken,
    ) -> Result<(), ChannelError> {
        if cancel.is_cancelled() {
            return Err(ChannelError::Cancelled);
        }

        let argv = self.config.exec_argv(target, command);
        debug!(program = %self.config.program, ?argv, %target, "launching remote command");

        let StreamOptions {
            stdin,
            stdout,
            stderr,
        } = streams;

        let mut child = Command::new(&self.config.program)
            .args(&argv)
            .stdin(piped_if(stdin.is_some()))
            .stdout(piped_if(stdout.is_some()))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ChannelError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        let stdin_pump = pump_stdin(child.stdin.take(), stdin);
        let stdout_pump = pump_stdout(child.stdout.take(), stdout);
        let stderr_pump = collect_stderr(child.stderr.take(), stderr);

        let run = async {
            let (stdin_result, stdout_result, stderr_result) =
                tokio::join!(stdin_pump, stdout_pump, stderr_pump);
            let status = child.wait().await?;

            if !status.success() {
                let stderr = stderr_result.unwrap_or_default();
                return Err(ChannelError::Exit {
                    status: status.to_string(),
                    stderr: stderr.trim().to_string(),
                });
            }

            stdin_result?;
            stdout_result?;
            stderr_result?;
            Ok::<(), ChannelError>(())
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChannelError::Cancelled),
            result = run => result,
        };

        match &result {
            Ok(()) => debug!(%target, "remote command finished"),
            Err(ChannelError::Cancelled) => debug!(%target, "remote command cancelled, launcher killed"),
            Err(e) => debug!(%target, error = %e, "remote command failed"),
        }
        result
    }

    async fn list(&self, context: &str) -> Result<Vec<String>, ChannelError> {
        if self.config.list_sub_targets.is_empty() {
            return Err(ChannelError::InvalidConfig(
                "no sub-target listing command configured".into(),
            ));
        }

        let argv = self.config.list_argv(context);
        debug!(program = %self.config.program, ?argv, "listing sub-targets");

        let output = Command::new(&self.config.program)
            .args(&argv)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ChannelError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(context, status = %output.status, %stderr, "sub-target listing failed");
            return Err(ChannelError::NotFound(if stderr.is_empty() {
                context.to_string()
            } else {
                format!("{context}: {stderr}")
            }));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }
}

impl ExecChannel for CommandChannel {
    fn stream<'a>(
        &'a self,
        target: &'a ExecTarget,
        command: &'a [String],
        streams: StreamOptions,
        cancel: CancellationToken,
    ) -> ChannelFuture<'a, ()> {
        Box::pin(self.run(target, command, streams, cancel))
    }
}

impl TargetResolver for CommandChannel {
    fn sub_targets<'a>(&'a self, context: &'a str) -> ChannelFuture<'a, Vec<String>> {
        Box::pin(self.list(context))
    }
}

fn piped_if(wired: bool) -> Stdio {
    if wired { Stdio::piped() } else { Stdio::null() }
}

async fn pump_stdin(pipe: Option<ChildStdin>, source: Option<BoxedReader>) -> io::Result<()> {
    let (Some(mut pipe), Some(mut source)) = (pipe, source) else {
        return Ok(());
    };

    let result = async {
        let copied = tokio::io::copy(&mut source, &mut pipe).await?;
        pipe.shutdown().await?;
        Ok::<_, io::Error>(copied)
    }
    .await;

    match result {
        Ok(bytes) => {
            debug!(bytes, "stdin forwarded");
            Ok(())
        }
        // The remote command may exit without reading all of its input.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("remote closed stdin early");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn pump_stdout(pipe: Option<ChildStdout>, sink: Option<BoxedWriter>) -> io::Result<()> {
    let (Some(mut pipe), Some(mut sink)) = (pipe, sink) else {
        return Ok(());
    };

    let copied = tokio::io::copy(&mut pipe, &mut sink).await?;
    sink.flush().await?;
    sink.shutdown().await?;
    debug!(bytes = copied, "stdout drained");
    Ok(())
}

async fn collect_stderr(
    pipe: Option<ChildStderr>,
    mut sink: Option<BoxedWriter>,
) -> io::Result<String> {
    let Some(mut pipe) = pipe else {
        return Ok(String::new());
    };

    let mut tail = Vec::new();
    let mut buf = vec![0u8; STDERR_CHUNK];
    loop {
        let n = pipe.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if let Some(sink) = sink.as_mut() {
            sink.write_all(&buf[..n]).await?;
        }
        tail.extend_from_slice(&buf[..n]);
        if tail.len() > STDERR_TAIL {
            let excess = tail.len() - STDERR_TAIL;
            tail.drain(..excess);
        }
    }

    if let Some(mut sink) = sink {
        sink.flush().await?;
    }
    Ok(String::from_utf8_lossy(&tail).into_owned())
}
