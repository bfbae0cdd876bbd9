//! In-process remote backed by a temporary directory.
//!
//! Understands the handful of commands the transfer layer sends and records
//! every call, so tests can assert both on the resulting remote tree and on
//! what was (or was not) executed.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Mutex;

use execcp_archive::{build_with_root, clean_path, sanitize, strip_leading_slash};
use execcp_channel::{
    BoxedReader, ChannelError, ChannelFuture, ExecChannel, ExecTarget, StreamOptions,
    TargetResolver,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

pub(crate) const CONTEXT: &str = "pod-0";
pub(crate) const SUB_TARGET: &str = "main";

pub(crate) struct FakeRemote {
    root: TempDir,
    commands: Mutex<Vec<Vec<String>>>,
    stdin_sizes: Mutex<Vec<usize>>,
    resolver_calls: Mutex<usize>,
    failures: Mutex<Vec<(String, String)>>,
    served_archive: Mutex<Option<Vec<u8>>>,
    served_failure: Mutex<Option<String>>,
    stalls: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
            commands: Mutex::new(Vec::new()),
            stdin_sizes: Mutex::new(Vec::new()),
            resolver_calls: Mutex::new(0),
            failures: Mutex::new(Vec::new()),
            served_archive: Mutex::new(None),
            served_failure: Mutex::new(None),
            stalls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn target(&self) -> ExecTarget {
        ExecTarget::new(CONTEXT).with_sub_target(SUB_TARGET)
    }

    /// Local location of a remote path.
    pub(crate) fn path(&self, remote: &str) -> PathBuf {
        self.root
            .path()
            .join(strip_leading_slash(&clean_path(remote)))
    }

    pub(crate) fn mkdir(&self, remote: &str) {
        std::fs::create_dir_all(self.path(remote)).unwrap();
    }

    pub(crate) fn write_file(&self, remote: &str, data: &[u8]) {
        let path = self.path(remote);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    pub(crate) fn read(&self, remote: &str) -> Vec<u8> {
        std::fs::read(self.path(remote)).unwrap()
    }

    pub(crate) fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }

    pub(crate) fn stdin_sizes(&self) -> Vec<usize> {
        self.stdin_sizes.lock().unwrap().clone()
    }

    pub(crate) fn resolver_calls(&self) -> usize {
        *self.resolver_calls.lock().unwrap()
    }

    /// Fails every command containing `trigger` with exit 2 and `stderr`.
    pub(crate) fn fail_command(&self, trigger: &str, stderr: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((trigger.to_string(), stderr.to_string()));
    }

    /// Replaces the output of the next `tar -cf` with raw bytes.
    pub(crate) fn serve_archive(&self, data: Vec<u8>) {
        *self.served_archive.lock().unwrap() = Some(data);
    }

    /// Like `serve_archive`, then exits 2 with `stderr` once the bytes are sent.
    pub(crate) fn serve_archive_then_fail(&self, data: Vec<u8>, stderr: &str) {
        self.serve_archive(data);
        *self.served_failure.lock().unwrap() = Some(stderr.to_string());
    }

    /// Commands containing `trigger` drain stdin and then never finish.
    pub(crate) fn stall_command(&self, trigger: &str) {
        self.stalls.lock().unwrap().push(trigger.to_string());
    }

    fn stalls_on(&self, command: &[String]) -> bool {
        self.stalls
            .lock()
            .unwrap()
            .iter()
            .any(|trigger| command.iter().any(|arg| arg == trigger))
    }

    fn scripted_failure(&self, command: &[String]) -> Option<String> {
        self.failures
            .lock()
            .unwrap()
            .iter()
            .find(|(trigger, _)| command.iter().any(|arg| arg == trigger))
            .map(|(_, stderr)| stderr.clone())
    }

    async fn drain(&self, mut stdin: BoxedReader) -> Result<Vec<u8>, ChannelError> {
        let mut data = Vec::new();
        stdin.read_to_end(&mut data).await?;
        self.stdin_sizes.lock().unwrap().push(data.len());
        Ok(data)
    }

    async fn run(&self, command: &[String], streams: StreamOptions) -> Result<(), ChannelError> {
        let StreamOptions { stdin, stdout, .. } = streams;

        if let Some(stderr) = self.scripted_failure(command) {
            if let Some(stdin) = stdin {
                self.drain(stdin).await?;
            }
            return Err(exit(2, &stderr));
        }

        if self.stalls_on(command) {
            if let Some(stdin) = stdin {
                self.drain(stdin).await?;
            }
            return std::future::pending().await;
        }

        let args: Vec<&str> = command.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["test", "-d", path] => {
                if self.path(path).is_dir() {
                    Ok(())
                } else {
                    Err(exit(1, ""))
                }
            }
            ["tar", "-xmf", "-", rest @ ..] => {
                let data = match stdin {
                    Some(stdin) => self.drain(stdin).await?,
                    None => Vec::new(),
                };
                let (dir, shown) = match rest {
                    ["-C", dir] => (self.path(dir), dir.to_string()),
                    _ => (self.root.path().to_path_buf(), ".".to_string()),
                };
                if !dir.is_dir() {
                    return Err(exit(
                        2,
                        &format!("tar: {shown}: Cannot open: No such file or directory"),
                    ));
                }
                execcp_archive::extract(Cursor::new(data), &dir, "")
                    .map(|_| ())
                    .map_err(|e| exit(2, &e.to_string()))
            }
            ["tar", "-cf", "-", path] => {
                let served = self.served_archive.lock().unwrap().take();
                let data = match served {
                    Some(data) => data,
                    None => {
                        let local = self.path(path);
                        if !local.exists() {
                            return Err(exit(
                                2,
                                &format!("tar: {path}: Cannot stat: No such file or directory"),
                            ));
                        }
                        let name = sanitize(strip_leading_slash(&clean_path(path)));
                        let mut out = Vec::new();
                        build_with_root(&local, &name, &mut out)
                            .map_err(|e| exit(2, &e.to_string()))?;
                        out
                    }
                };
                write_stdout(stdout, &data).await?;
                match self.served_failure.lock().unwrap().take() {
                    Some(stderr) => Err(exit(2, &stderr)),
                    None => Ok(()),
                }
            }
            ["echo", words @ ..] => write_stdout(stdout, format!("{}\n", words.join(" ")).as_bytes()).await,
            [program, ..] => Err(exit(127, &format!("{program}: command not found"))),
            [] => Err(exit(127, "empty command")),
        }
    }
}

impl ExecChannel for FakeRemote {
    fn stream<'a>(
        &'a self,
        target: &'a ExecTarget,
        command: &'a [String],
        streams: StreamOptions,
        cancel: CancellationToken,
    ) -> ChannelFuture<'a, ()> {
        self.commands.lock().unwrap().push(command.to_vec());

        Box::pin(async move {
            if target.context != CONTEXT {
                return Err(ChannelError::NotFound(target.context.clone()));
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ChannelError::Cancelled),
                result = self.run(command, streams) => result,
            }
        })
    }
}

impl TargetResolver for FakeRemote {
    fn sub_targets<'a>(&'a self, context: &'a str) -> ChannelFuture<'a, Vec<String>> {
        *self.resolver_calls.lock().unwrap() += 1;

        Box::pin(async move {
            if context == CONTEXT {
                Ok(vec![SUB_TARGET.to_string()])
            } else {
                Err(ChannelError::NotFound(format!("pods \"{context}\" not found")))
            }
        })
    }
}

fn exit(code: i32, stderr: &str) -> ChannelError {
    ChannelError::Exit {
        status: format!("exit status: {code}"),
        stderr: stderr.to_string(),
    }
}

async fn write_stdout(
    stdout: Option<execcp_channel::BoxedWriter>,
    data: &[u8],
) -> Result<(), ChannelError> {
    if let Some(mut stdout) = stdout {
        stdout.write_all(data).await?;
        stdout.shutdown().await?;
    }
    Ok(())
}
