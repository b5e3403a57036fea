//! Sync configuration passed to the store and orchestrator at construction.

use std::collections::BTreeSet;
use std::path::PathBuf;

/// Default page size used when paging through the remote inventory.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default chat model used by `ask`.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Settings shared by every sync operation.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote library the vault is mirrored into
    pub library_id: u64,
    /// Location of the persisted mapping file
    pub mapping_path: PathBuf,
    /// Folder names whose contents never take part in sync
    pub ignore_folders: BTreeSet<String>,
    /// Page size for remote listings
    pub page_size: u32,
    /// Maximum number of uploads in flight during one batch
    pub upload_concurrency: usize,
    /// Model name forwarded to `ask`
    pub model: String,
}

impl SyncConfig {
    pub fn new(library_id: u64, mapping_path: impl Into<PathBuf>) -> Self {
        Self {
            library_id,
            mapping_path: mapping_path.into(),
            ignore_folders: BTreeSet::new(),
            page_size: DEFAULT_PAGE_SIZE,
            upload_concurrency: 1,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_ignore_folders<I, S>(mut self, folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_folders = folders.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_upload_concurrency(mut self, concurrency: usize) -> Self {
        self.upload_concurrency = concurrency.max(1);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Parse the comma-separated ignore setting (`"archive, templates"`).
///
/// Items are trimmed and empty items dropped. Matching stays literal, so no
/// case folding happens here either.
pub fn parse_ignore_folders(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
