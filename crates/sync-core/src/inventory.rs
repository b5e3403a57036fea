//! Local inventory: snapshot of the syncable files currently in the vault.

use crate::fs::{FileSystem, FsError, Result};
use crate::mapping::{FileMapping, FileStatSnapshot, MappingSet};

/// Extension of files that take part in sync.
pub const SYNC_EXTENSION: &str = ".md";

/// True for paths the sync engine uploads (markdown, not hidden).
pub fn is_syncable_path(path: &str) -> bool {
    let path = path.trim_matches('/');
    path.ends_with(SYNC_EXTENSION) && !path.split('/').any(|segment| segment.starts_with('.'))
}

/// List all syncable files in the vault.
///
/// Hidden files and directories are skipped, which also keeps private state
/// directories out of the inventory.
pub async fn list_syncable_files<F: FileSystem + ?Sized>(fs: &F) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let mut dirs_to_visit = vec![String::new()]; // Start with root

    while let Some(dir) = dirs_to_visit.pop() {
        let entries = fs.list(&dir).await?;

        for entry in entries {
            if entry.name.starts_with('.') {
                continue;
            }

            let path = if dir.is_empty() {
                entry.name.clone()
            } else {
                format!("{}/{}", dir, entry.name)
            };

            if entry.is_dir {
                dirs_to_visit.push(path);
            } else if path.ends_with(SYNC_EXTENSION) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Build a fresh inventory with every doc id unset.
///
/// Fails if any directory cannot be listed or a file cannot be stat'ed for
/// a reason other than being gone; callers treat that as fatal for the whole
/// operation. A listed file that is gone by the time it is stat'ed (deleted
/// meanwhile, or a dangling symlink) is skipped.
pub async fn build_inventory<F: FileSystem + ?Sized>(fs: &F) -> Result<MappingSet> {
    let mut inventory = MappingSet::new();
    for path in list_syncable_files(fs).await? {
        let stat = match fs.stat(&path).await {
            Ok(stat) => stat,
            Err(FsError::NotFound(_)) => {
                tracing::warn!("Skipping {}: listed but cannot be stat'ed", path);
                continue;
            }
            Err(e) => return Err(e),
        };
        inventory.upsert(FileMapping::new(&path, FileStatSnapshot::from(&stat)));
    }
    tracing::debug!("Local inventory: {} file(s)", inventory.len());
    Ok(inventory)
}
