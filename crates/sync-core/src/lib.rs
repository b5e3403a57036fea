//! library-sync-core: Keeps a vault of markdown notes mirrored into a remote
//! knowledge-base library.
//!
//! This crate provides the core functionality for:
//! - Inventorying the syncable files of a vault
//! - Persisting the file-to-document mapping as JSON
//! - Planning incremental, drift and delete reconciliation
//! - FileSystem and RemoteLibrary trait abstractions

pub mod config;
pub mod fs;
pub mod ignore;
pub mod inventory;
pub mod mapping;
pub mod orchestrator;
pub mod reconcile;
pub mod remote;
pub mod report;
pub mod upload;

pub use config::{parse_ignore_folders, SyncConfig};
pub use fs::{FileEntry, FileStat, FileSystem, FsError, InMemoryFs};
pub use inventory::build_inventory;
pub use mapping::{FileMapping, FileStatSnapshot, MappingSet, MappingStore, StoreError};
pub use orchestrator::{SyncError, SyncOrchestrator};
pub use remote::{Answer, DocPage, InMemoryLibrary, RemoteDocInfo, RemoteError, RemoteLibrary};
pub use report::SyncReport;
pub use upload::UploadError;
