//! Outcome of one sync operation.

use std::fmt;

/// Report from a sync operation. Every list holds vault paths, except
/// `deleted_remote` which holds doc ids.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Files uploaded for the first time
    pub uploaded: Vec<String>,
    /// Files re-uploaded after growing
    pub reuploaded: Vec<String>,
    /// Empty files left pending until they gain content
    pub skipped_empty: Vec<String>,
    /// Files whose upload failed; their entries stay stale
    pub failed: Vec<String>,
    /// Entries dropped from the mapping
    pub removed: Vec<String>,
    /// Files matched to a remote document by title
    pub matched: Vec<String>,
    /// Files with no remote document of their title
    pub unmatched: Vec<String>,
    /// Remote documents deleted
    pub deleted_remote: Vec<String>,
}

impl SyncReport {
    /// Check if the mapping or the library changed
    pub fn has_changes(&self) -> bool {
        !self.uploaded.is_empty()
            || !self.reuploaded.is_empty()
            || !self.removed.is_empty()
            || !self.matched.is_empty()
            || !self.unmatched.is_empty()
            || !self.deleted_remote.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = [
            ("uploaded", self.uploaded.len()),
            ("re-uploaded", self.reuploaded.len()),
            ("skipped empty", self.skipped_empty.len()),
            ("failed", self.failed.len()),
            ("removed", self.removed.len()),
            ("matched", self.matched.len()),
            ("unmatched", self.unmatched.len()),
            ("deleted remotely", self.deleted_remote.len()),
        ];

        let parts: Vec<String> = counts
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|(label, n)| format!("{} {}", n, label))
            .collect();

        if parts.is_empty() {
            write!(f, "nothing to do")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}
