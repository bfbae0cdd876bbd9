//! execcp entry point.

mod cli;
mod config;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use execcp_channel::CommandChannel;
use execcp_transfer::TransferClient;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `exec` output stays clean on stdout.
    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load(cli.config.as_deref())?;
    let channel = CommandChannel::new(config.launcher.clone()).context("invalid launcher")?;
    let client = TransferClient::from_backend(Arc::new(channel), config.transfer_options());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::Upload {
            target,
            local,
            remote,
        } => {
            let target = target.to_target();
            let summary = client
                .upload(&target, &local, &remote, cancel)
                .await
                .with_context(|| format!("uploading {} to {target}:{remote}", local.display()))?;
            info!(
                %target,
                destination = %summary.destination,
                entries = summary.archive.entries,
                bytes = summary.archive.bytes,
                "uploaded"
            );
        }
        Command::Download {
            target,
            remote,
            local,
        } => {
            let target = target.to_target();
            let summary = client
                .download(&target, &remote, &local, cancel)
                .await
                .with_context(|| format!("downloading {target}:{remote} to {}", local.display()))?;
            info!(
                %target,
                destination = %summary.destination.display(),
                files = summary.archive.files,
                bytes = summary.archive.bytes,
                "downloaded"
            );
        }
        Command::Exec { target, command } => {
            let target = target.to_target();
            let output = client
                .exec(&target, &command, cancel)
                .await
                .with_context(|| format!("running {command:?} in {target}"))?;
            if !output.stdout.is_empty() {
                println!("{}", output.stdout);
            }
            if !output.stderr.is_empty() {
                eprintln!("{}", output.stderr);
            }
        }
    }

    Ok(())
}
