//! Ignore policy: decides whether a file takes part in sync.

use crate::mapping::FileMapping;
use std::collections::BTreeSet;

/// True when any of the file's ancestor folders is in the ignore set.
///
/// Matching is exact string equality. Since every file lists the root as
/// `"/"`, putting `"/"` in the set disables sync for the whole vault.
pub fn should_ignore(mapping: &FileMapping, ignore_folders: &BTreeSet<String>) -> bool {
    if ignore_folders.is_empty() {
        return false;
    }
    mapping
        .parent_folders
        .iter()
        .any(|folder| ignore_folders.contains(folder))
}
