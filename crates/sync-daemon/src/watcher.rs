//! Delete watcher with debouncing for the vault.
//!
//! Uses notify-debouncer-mini for efficient file change detection. Only
//! deletions are reported; new and modified files are picked up by the
//! periodic sync.

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// A vault path that no longer exists.
///
/// The path may have been a file or a folder; that can no longer be told
/// from the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteEvent {
    /// Path relative to vault root
    pub path: String,
}

/// Watcher that monitors the vault directory for deletions.
pub struct DeleteWatcher {
    /// Vault base path
    vault_path: PathBuf,
    /// Debouncer handle (must keep alive)
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    /// Receiver for delete events
    event_rx: mpsc::UnboundedReceiver<DeleteEvent>,
}

impl DeleteWatcher {
    /// Create a new watcher for the vault.
    ///
    /// Uses 200ms debounce period to avoid rapid-fire events during saves.
    pub fn new(vault_path: PathBuf) -> Result<Self> {
        // Canonicalize the path to resolve symlinks. On macOS, /var/folders/...
        // is actually /private/var/folders/..., and FSEvents needs the real path.
        let vault_path = vault_path.canonicalize().unwrap_or(vault_path);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let vault_path_clone = vault_path.clone();

        let mut debouncer = new_debouncer(
            Duration::from_millis(200),
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    for event in events {
                        if let Some(delete) = Self::process_event(&event, &vault_path_clone) {
                            if event_tx.send(delete).is_err() {
                                // Receiver dropped
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("File watcher error: {}", e);
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(&vault_path, RecursiveMode::Recursive)?;

        Ok(Self {
            vault_path,
            _debouncer: debouncer,
            event_rx,
        })
    }

    /// Turn a debounced event into a delete event if the path is gone.
    fn process_event(event: &DebouncedEvent, vault_path: &Path) -> Option<DeleteEvent> {
        let relative = event.path.strip_prefix(vault_path).ok()?;
        let relative_str = relative.to_str()?.replace('\\', "/");

        if relative_str.is_empty() {
            return None;
        }

        // Skip hidden files and directories, including the state directory
        if relative_str.starts_with('.') || relative_str.contains("/.") {
            return None;
        }

        if event.path.exists() {
            return None;
        }

        debug!("Path deleted: {}", relative_str);
        Some(DeleteEvent { path: relative_str })
    }

    /// Get the receiver for delete events.
    pub fn event_rx(&mut self) -> &mut mpsc::UnboundedReceiver<DeleteEvent> {
        &mut self.event_rx
    }

    /// Get the vault path.
    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }
}
