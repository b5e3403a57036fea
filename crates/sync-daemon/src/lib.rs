//! library-sync daemon library: Exposes internal modules for testing.
//!
//! This is a thin library layer over the daemon components,
//! allowing integration tests to access internal types.

pub mod client;
pub mod config;
pub mod native_fs;
pub mod watcher;

// Re-export key types for convenience
pub use client::HttpLibrary;
pub use config::{Cli, Command, Config, ConfigError};
pub use native_fs::NativeFs;
pub use watcher::{DeleteEvent, DeleteWatcher};
