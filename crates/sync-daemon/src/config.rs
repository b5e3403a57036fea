//! Command-line and environment configuration for the daemon.

use clap::{Parser, Subcommand};
use library_sync_core::config::{parse_ignore_folders, SyncConfig, DEFAULT_MODEL};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{DEFAULT_ASK_URL, DEFAULT_BASE_URL};

/// Private state directory created inside the vault by default
pub const STATE_DIR: &str = ".library-sync";
/// Mapping file name inside the state directory
pub const MAPPING_FILE: &str = "mapping.json";

#[derive(Parser, Debug)]
#[command(name = "library-sync")]
#[command(about = "Mirror a markdown vault into a knowledge-base library")]
pub struct Cli {
    /// Path to the vault directory
    #[arg(short, long, env = "LIBRARY_SYNC_VAULT")]
    pub vault: String,

    /// API key of the library service
    #[arg(long, env = "LIBRARY_SYNC_API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    /// Library the vault is mirrored into
    #[arg(long, env = "LIBRARY_SYNC_LIBRARY_ID", default_value_t = 0)]
    pub library_id: u64,

    /// Base URL of the library endpoints
    #[arg(long, env = "LIBRARY_SYNC_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// URL of the ask endpoint
    #[arg(long, env = "LIBRARY_SYNC_ASK_URL", default_value = DEFAULT_ASK_URL)]
    pub ask_url: String,

    /// Chat model used to answer questions
    #[arg(long, env = "LIBRARY_SYNC_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Comma-separated folder names excluded from sync
    #[arg(long, env = "LIBRARY_SYNC_IGNORE_FOLDERS", default_value = "")]
    pub ignore_folders: String,

    /// Directory holding the mapping file (defaults to <vault>/.library-sync)
    #[arg(long, env = "LIBRARY_SYNC_STATE_DIR")]
    pub state_dir: Option<String>,

    /// Minutes between scheduled syncs in watch mode
    #[arg(long, default_value_t = 30)]
    pub interval_minutes: u64,

    /// Maximum concurrent uploads
    #[arg(long, default_value_t = 1)]
    pub upload_concurrency: usize,

    /// Enable verbose logging
    #[arg(long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Upload new files and re-upload files that grew
    Sync,
    /// Upload new files only
    Incremental,
    /// Rebuild the mapping from the documents already in the library
    Rebuild,
    /// Upload one file now
    Upload { path: String },
    /// Delete a file or folder from the library
    Delete { path: String },
    /// Ask the library a question
    Ask { query: String },
    /// Sync on a schedule and follow deletions until interrupted
    Watch,
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub vault_path: PathBuf,
    pub api_key: String,
    pub library_id: u64,
    pub base_url: String,
    pub ask_url: String,
    pub model: String,
    pub ignore_folders: BTreeSet<String>,
    pub state_dir: PathBuf,
    pub interval: Duration,
    pub upload_concurrency: usize,
}

impl Config {
    /// Resolve and validate the parsed command line.
    ///
    /// An empty API key or a library id of 0 is rejected: nothing may talk
    /// to the library until both are configured.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let vault_path = expand_tilde(&cli.vault);
        if !vault_path.is_dir() {
            return Err(ConfigError::VaultNotFound(vault_path));
        }
        if cli.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if cli.library_id == 0 {
            return Err(ConfigError::MissingLibraryId);
        }
        if cli.interval_minutes == 0 {
            return Err(ConfigError::InvalidInterval);
        }

        let state_dir = match &cli.state_dir {
            Some(dir) => expand_tilde(dir),
            None => vault_path.join(STATE_DIR),
        };

        Ok(Self {
            vault_path,
            api_key: cli.api_key.trim().to_string(),
            library_id: cli.library_id,
            base_url: cli.base_url.clone(),
            ask_url: cli.ask_url.clone(),
            model: cli.model.clone(),
            ignore_folders: parse_ignore_folders(&cli.ignore_folders),
            state_dir,
            interval: Duration::from_secs(cli.interval_minutes * 60),
            upload_concurrency: cli.upload_concurrency.max(1),
        })
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.state_dir.join(MAPPING_FILE)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::new(self.library_id, self.mapping_path())
            .with_ignore_folders(self.ignore_folders.iter().cloned())
            .with_upload_concurrency(self.upload_concurrency)
            .with_model(self.model.clone())
    }

    /// Turn a command-line path into a vault-relative one.
    ///
    /// Absolute paths must point inside the vault, and never at the vault
    /// root itself.
    pub fn vault_relative(&self, path: &str) -> Result<String, ConfigError> {
        let candidate = expand_tilde(path);
        let relative = if candidate.is_absolute() {
            let vault = self
                .vault_path
                .canonicalize()
                .unwrap_or_else(|_| self.vault_path.clone());
            let candidate = canonicalize_parent(&candidate);
            candidate
                .strip_prefix(&vault)
                .map(Path::to_path_buf)
                .map_err(|_| ConfigError::OutsideVault(path.to_string()))?
        } else {
            candidate
        };

        let relative = relative.to_string_lossy().replace('\\', "/");
        let relative = relative
            .split('/')
            .filter(|part| !part.is_empty() && *part != ".")
            .collect::<Vec<_>>()
            .join("/");
        if relative.is_empty() {
            return Err(ConfigError::VaultRoot(path.to_string()));
        }
        Ok(relative)
    }
}

/// Canonicalize the parent of `path`, which may itself no longer exist.
fn canonicalize_parent(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// Expand ~ or ~/ prefix to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Vault directory not found: {}", .0.display())]
    VaultNotFound(PathBuf),

    #[error("No API key configured (--api-key or LIBRARY_SYNC_API_KEY)")]
    MissingApiKey,

    #[error("No library id configured (--library-id or LIBRARY_SYNC_LIBRARY_ID)")]
    MissingLibraryId,

    #[error("Sync interval must be at least one minute")]
    InvalidInterval,

    #[error("Path is outside the vault: {0}")]
    OutsideVault(String),

    #[error("Path refers to the vault root itself: {0}")]
    VaultRoot(String),
}
