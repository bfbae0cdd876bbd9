//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use execcp_channel::ExecTarget;

#[derive(Debug, Parser)]
#[command(
    name = "execcp",
    version,
    about = "Copy files and directories to and from remote execution targets"
)]
pub struct Cli {
    /// Configuration file (defaults to ~/.config/execcp/config.toml).
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Copy a local file or directory into the target.
    Upload {
        #[command(flatten)]
        target: TargetArgs,
        /// Local source path.
        local: PathBuf,
        /// Remote destination; an existing directory receives the source by name.
        remote: String,
    },

    /// Copy a remote file or directory out of the target.
    Download {
        #[command(flatten)]
        target: TargetArgs,
        /// Remote source path.
        remote: String,
        /// Local directory receiving the source by name.
        local: PathBuf,
    },

    /// Run a command inside the target and print its output.
    Exec {
        #[command(flatten)]
        target: TargetArgs,
        /// Command and arguments, after `--`.
        #[arg(last = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },
}

#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Execution context, e.g. a pod name.
    pub context: String,

    /// Sub-target inside the context, e.g. a container name.
    #[arg(short = 's', long = "sub-target", value_name = "NAME")]
    pub sub_target: Option<String>,
}

impl TargetArgs {
    pub fn to_target(&self) -> ExecTarget {
        let target = ExecTarget::new(&self.context);
        match &self.sub_target {
            Some(sub) => target.with_sub_target(sub),
            None => target,
        }
    }
}
