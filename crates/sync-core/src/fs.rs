//! FileSystem trait abstraction over the host vault.
//!
//! Implementations:
//! - `InMemoryFs` - For testing
//! - `NativeFs` (in sync-daemon) - Uses tokio::fs
//!
//! Paths are vault-relative and use `/` as the separator. The empty string is
//! the vault root.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("Not a directory: {0}")]
    NotDirectory(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// File metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// Creation time in milliseconds since epoch
    pub ctime_millis: u64,
    /// Modification time in milliseconds since epoch
    pub mtime_millis: u64,
    /// File size in bytes
    pub size: u64,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Directory entry
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// File or directory name (not full path)
    pub name: String,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Read-only view of the vault used by the sync engine.
///
/// Implementations must be `Send + Sync` so one orchestrator can be shared
/// between the scheduled sync and event handlers.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read file contents
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// List directory contents
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// Check if path exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Get file metadata
    async fn stat(&self, path: &str) -> Result<FileStat>;
}

#[derive(Debug, Clone)]
struct MemFile {
    content: Vec<u8>,
    ctime: u64,
    mtime: u64,
}

/// In-memory filesystem for testing
pub struct InMemoryFs {
    files: RwLock<HashMap<String, MemFile>>,
    dirs: RwLock<HashSet<String>>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        let mut dirs = HashSet::new();
        dirs.insert(String::new()); // Root directory
        Self {
            files: RwLock::new(HashMap::new()),
            dirs: RwLock::new(dirs),
        }
    }

    /// Write file contents, creating parent directories.
    ///
    /// Keeps the original creation time when overwriting.
    pub fn write(&self, path: &str, content: &[u8]) {
        let path = Self::normalize_path(path);
        if let Some(parent) = Self::parent_path(&path) {
            self.mkdir(&parent);
        }

        let now = Self::current_time_ms();
        let mut files = self.files.write().unwrap();
        let ctime = files.get(&path).map(|f| f.ctime).unwrap_or(now);
        files.insert(
            path,
            MemFile {
                content: content.to_vec(),
                ctime,
                mtime: now,
            },
        );
    }

    /// Create directory (and parents if needed)
    pub fn mkdir(&self, path: &str) {
        let mut current = Self::normalize_path(path);
        let mut dirs = self.dirs.write().unwrap();
        while !current.is_empty() {
            dirs.insert(current.clone());
            current = match current.rfind('/') {
                Some(pos) => current[..pos].to_string(),
                None => String::new(),
            };
        }
    }

    /// Delete a file, or a directory together with everything below it.
    pub fn delete(&self, path: &str) -> Result<()> {
        let path = Self::normalize_path(path);

        if self.files.write().unwrap().remove(&path).is_some() {
            return Ok(());
        }

        let mut dirs = self.dirs.write().unwrap();
        if path.is_empty() || !dirs.remove(&path) {
            return Err(FsError::NotFound(path));
        }
        let prefix = format!("{}/", path);
        dirs.retain(|d| !d.starts_with(&prefix));
        self.files
            .write()
            .unwrap()
            .retain(|f, _| !f.starts_with(&prefix));
        Ok(())
    }

    fn current_time_ms() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn normalize_path(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    fn parent_path(path: &str) -> Option<String> {
        if path.is_empty() {
            return None;
        }
        match path.rfind('/') {
            Some(pos) => Some(path[..pos].to_string()),
            None => Some(String::new()),
        }
    }
}

impl Default for InMemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = Self::normalize_path(path);
        if self.dirs.read().unwrap().contains(&path) {
            return Err(FsError::IsDirectory(path));
        }
        let files = self.files.read().unwrap();
        files
            .get(&path)
            .map(|f| f.content.clone())
            .ok_or(FsError::NotFound(path))
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let path = Self::normalize_path(path);
        let dirs = self.dirs.read().unwrap();
        if !dirs.contains(&path) {
            if self.files.read().unwrap().contains_key(&path) {
                return Err(FsError::NotDirectory(path));
            }
            return Err(FsError::NotFound(path));
        }

        let mut entries = Vec::new();
        let is_child =
            |candidate: &str| Self::parent_path(candidate).as_deref() == Some(path.as_str());
        let name_of = |candidate: &str| {
            candidate
                .rsplit('/')
                .next()
                .unwrap_or(candidate)
                .to_string()
        };

        for file_path in self.files.read().unwrap().keys() {
            if is_child(file_path) {
                entries.push(FileEntry {
                    name: name_of(file_path),
                    is_dir: false,
                });
            }
        }
        for dir_path in dirs.iter() {
            if !dir_path.is_empty() && is_child(dir_path) {
                entries.push(FileEntry {
                    name: name_of(dir_path),
                    is_dir: true,
                });
            }
        }

        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = Self::normalize_path(path);
        let files = self.files.read().unwrap();
        let dirs = self.dirs.read().unwrap();
        Ok(files.contains_key(&path) || dirs.contains(&path))
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        let path = Self::normalize_path(path);

        if let Some(file) = self.files.read().unwrap().get(&path) {
            return Ok(FileStat {
                ctime_millis: file.ctime,
                mtime_millis: file.mtime,
                size: file.content.len() as u64,
                is_dir: false,
            });
        }

        if self.dirs.read().unwrap().contains(&path) {
            return Ok(FileStat {
                ctime_millis: 0,
                mtime_millis: 0,
                size: 0,
                is_dir: true,
            });
        }

        Err(FsError::NotFound(path))
    }
}
