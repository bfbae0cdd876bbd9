//! CLI configuration.
//!
//! Configuration is stored as TOML:
//! - Linux/macOS: `~/.config/execcp/config.toml`
//! - Windows: `%APPDATA%/execcp/config.toml`
//!
//! A missing default file means built-in defaults; nothing is written back.

use std::path::{Path, PathBuf};

use anyhow::Context;
use execcp_channel::LauncherConfig;
use execcp_transfer::TransferOptions;
use serde::{Deserialize, Serialize};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// How remote commands are launched.
    #[serde(default)]
    pub launcher: LauncherConfig,

    #[serde(default)]
    pub transfer: TransferSection,
}

/// `[transfer]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSection {
    /// Directory for temporary upload archives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Loads `explicit`, or the default location when `None`.
    ///
    /// An explicit file must exist; a missing default file yields defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = config_path();
                if !path.exists() {
                    tracing::debug!(path = %path.display(), "no configuration file, using defaults");
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;

        tracing::debug!(path = %path.display(), program = %config.launcher.program, "configuration loaded");
        Ok(config)
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            temp_dir: self.transfer.temp_dir.clone(),
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("execcp").join("config.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("execcp")
            .join("config.toml")
    }
}
