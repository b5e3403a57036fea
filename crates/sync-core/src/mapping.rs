//! File-to-document mapping model and its JSON-backed store.
//!
//! The store is a single JSON array of [`FileMapping`] records kept at a
//! private path. Every mutation rewrites the whole file: callers load the set,
//! change it in memory and save it back.

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::fs::FileStat;

/// Name recorded for the vault root in `parent_folders`.
pub const ROOT_FOLDER: &str = "/";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Mapping file {} is corrupted: {source}", .path.display())]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Mapping file IO error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize mapping: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Stat snapshot recorded when a file was last uploaded or inventoried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatSnapshot {
    /// Creation time in milliseconds since epoch
    pub ctime: u64,
    /// Modification time in milliseconds since epoch
    pub mtime: u64,
    /// Size in bytes
    pub size: u64,
}

impl From<&FileStat> for FileStatSnapshot {
    fn from(stat: &FileStat) -> Self {
        Self {
            ctime: stat.ctime_millis,
            mtime: stat.mtime_millis,
            size: stat.size,
        }
    }
}

/// Association between one local file and, optionally, one remote document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMapping {
    /// Base name, for display only
    pub file_name: String,
    /// Vault-relative path; identity key of the mapping
    pub file_full_path: String,
    pub file_stat: FileStatSnapshot,
    /// Ancestor folder names, immediate parent first, root as `"/"`
    pub parent_folders: Vec<String>,
    /// Remote document id, absent until an upload succeeded
    #[serde(
        default,
        alias = "aiproxyLibraryDocId",
        skip_serializing_if = "Option::is_none"
    )]
    pub remote_doc_id: Option<String>,
}

impl FileMapping {
    /// Build a doc-id-less mapping for a vault-relative path.
    pub fn new(path: &str, stat: FileStatSnapshot) -> Self {
        let path = path.trim_matches('/');
        let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
        Self {
            file_name,
            file_full_path: path.to_string(),
            file_stat: stat,
            parent_folders: parent_folders_of(path),
            remote_doc_id: None,
        }
    }

    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.remote_doc_id = Some(doc_id.into());
        self
    }

    pub fn has_doc_id(&self) -> bool {
        self.remote_doc_id.is_some()
    }

    /// True when this file sits at or below `folder`.
    ///
    /// Matches on whole path segments, so `notes` does not cover `notes2/a.md`.
    pub fn is_within(&self, folder: &str) -> bool {
        let folder = folder.trim_matches('/');
        if folder.is_empty() {
            return true;
        }
        self.file_full_path
            .strip_prefix(folder)
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Ancestor folder names of a vault-relative path.
///
/// `notes/sub/a.md` yields `["sub", "notes", "/"]`; a root-level file yields
/// `["/"]`.
pub fn parent_folders_of(path: &str) -> Vec<String> {
    let mut segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    segments.pop(); // the file itself

    let mut folders: Vec<String> = segments.iter().rev().map(|s| s.to_string()).collect();
    folders.push(ROOT_FOLDER.to_string());
    folders
}

/// In-memory mapping set keyed by `file_full_path`.
///
/// Serializes as a JSON array ordered by path. When a decoded array holds the
/// same path twice, the first record is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<FileMapping>", into = "Vec<FileMapping>")]
pub struct MappingSet {
    entries: BTreeMap<String, FileMapping>,
}

impl MappingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&FileMapping> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Insert or replace the entry for the mapping's path.
    pub fn upsert(&mut self, mapping: FileMapping) -> Option<FileMapping> {
        self.entries.insert(mapping.file_full_path.clone(), mapping)
    }

    pub fn remove(&mut self, path: &str) -> Option<FileMapping> {
        self.entries.remove(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileMapping> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&FileMapping) -> bool) {
        self.entries.retain(|_, mapping| keep(mapping));
    }

    /// Copy of the set with every doc id cleared.
    pub fn without_doc_ids(&self) -> Self {
        self.iter()
            .cloned()
            .map(|mut mapping| {
                mapping.remote_doc_id = None;
                mapping
            })
            .collect()
    }
}

impl From<Vec<FileMapping>> for MappingSet {
    fn from(mappings: Vec<FileMapping>) -> Self {
        let mut entries = BTreeMap::new();
        for mapping in mappings {
            entries
                .entry(mapping.file_full_path.clone())
                .or_insert(mapping);
        }
        Self { entries }
    }
}

impl From<MappingSet> for Vec<FileMapping> {
    fn from(set: MappingSet) -> Self {
        set.entries.into_values().collect()
    }
}

impl FromIterator<FileMapping> for MappingSet {
    fn from_iter<I: IntoIterator<Item = FileMapping>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl IntoIterator for MappingSet {
    type Item = FileMapping;
    type IntoIter = std::collections::btree_map::IntoValues<String, FileMapping>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

/// Storage for the mapping file.
#[derive(Debug, Clone)]
pub struct MappingStore {
    /// Path to the storage file.
    path: PathBuf,
}

impl MappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where a corrupted mapping file is moved to (`<path>.bak`).
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// True when the mapping file is missing or has no content.
    pub fn needs_init(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(true);
        }
        let contents = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        Ok(contents.trim().is_empty())
    }

    /// Load the full mapping set from disk.
    pub fn load(&self) -> Result<MappingSet> {
        debug!("Reading mapping file: {}", self.path.display());
        let contents = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        serde_json::from_str(&contents).map_err(|source| StoreError::CorruptState {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the mapping file with `set`.
    ///
    /// The JSON is written to a sibling temp file first and renamed into
    /// place, so readers never observe a partial document.
    pub fn save(&self, set: &MappingSet) -> Result<()> {
        debug!("Writing mapping file: {} ({} entries)", self.path.display(), set.len());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        let mut buf = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        set.serialize(&mut ser)?;

        let tmp_path = self.temp_path();
        fs::write(&tmp_path, &buf).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Write `inventory` (doc ids cleared) when the file is missing or empty.
    ///
    /// Returns whether the file was (re)initialized.
    pub fn ensure_initialized(&self, inventory: &MappingSet) -> Result<bool> {
        if !self.needs_init()? {
            return Ok(false);
        }
        info!(
            "Initializing mapping file {} with {} local file(s)",
            self.path.display(),
            inventory.len()
        );
        self.save(&inventory.without_doc_ids())?;
        Ok(true)
    }

    /// Move the current file aside to `<path>.bak`, replacing an older backup.
    pub fn backup_corrupt(&self) -> Result<PathBuf> {
        let backup = self.backup_path();
        fs::rename(&self.path, &backup).map_err(|e| self.io_error(e))?;
        info!("Moved corrupted mapping file to {}", backup.display());
        Ok(backup)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
