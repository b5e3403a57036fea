//! Reconciliation planning between the stored mapping, the local inventory
//! and the remote inventory.
//!
//! Everything here is pure: functions take the three views and return the
//! converged set plus the remote work still to do. The orchestrator performs
//! that work and persists the outcome.
//!
//! Joins always match on the full vault path. Two files with the same name
//! in different folders are distinct documents.

use std::collections::{BTreeSet, HashMap};

use crate::ignore::should_ignore;
use crate::mapping::MappingSet;
use crate::remote::RemoteDocInfo;

/// Join the stored mapping with a fresh inventory.
///
/// - Ignored files are left out entirely.
/// - A local file whose stored entry has a doc id keeps that entry as is; it
///   holds the authoritative id and the stat of the last upload.
/// - Any other local file takes the inventory entry. A stored entry without a
///   doc id has no upload snapshot worth keeping, so its stat is refreshed.
/// - Stored entries without a local file are dropped.
pub fn join_incremental(
    stored: &MappingSet,
    local: &MappingSet,
    ignore_folders: &BTreeSet<String>,
) -> MappingSet {
    local
        .iter()
        .filter(|file| !should_ignore(file, ignore_folders))
        .map(|file| match stored.get(&file.file_full_path) {
            Some(existing) if existing.has_doc_id() => existing.clone(),
            _ => file.clone(),
        })
        .collect()
}

/// Uploads still owed by a joined set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    /// Doc-id-less entries with content
    pub uploads: Vec<String>,
    /// Doc-id-less entries recorded as empty; the library rejects those
    pub skipped_empty: Vec<String>,
}

pub fn plan_uploads(set: &MappingSet) -> UploadPlan {
    let mut plan = UploadPlan::default();
    for mapping in set.iter().filter(|m| !m.has_doc_id()) {
        if mapping.file_stat.size == 0 {
            plan.skipped_empty.push(mapping.file_full_path.clone());
        } else {
            plan.uploads.push(mapping.file_full_path.clone());
        }
    }
    plan
}

/// A mapped file that grew since its last upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drift {
    pub path: String,
    pub doc_id: String,
    pub recorded_size: u64,
    pub current_size: u64,
}

/// Size is the change signal. Only growth counts; an edit that shrinks a
/// file is not detected.
pub fn has_drifted(recorded_size: u64, current_size: u64) -> bool {
    current_size > recorded_size
}

/// Entries with a doc id whose file is now larger than when uploaded.
pub fn detect_drift(set: &MappingSet, local: &MappingSet) -> Vec<Drift> {
    set.iter()
        .filter_map(|mapping| {
            let doc_id = mapping.remote_doc_id.as_ref()?;
            let current = local.get(&mapping.file_full_path)?;
            has_drifted(mapping.file_stat.size, current.file_stat.size).then(|| Drift {
                path: mapping.file_full_path.clone(),
                doc_id: doc_id.clone(),
                recorded_size: mapping.file_stat.size,
                current_size: current.file_stat.size,
            })
        })
        .collect()
}

/// Index remote documents by title, keeping the first listed document for
/// a repeated title.
pub fn index_by_title(remote: &[RemoteDocInfo]) -> HashMap<&str, &RemoteDocInfo> {
    let mut index = HashMap::with_capacity(remote.len());
    for doc in remote {
        index.entry(doc.title.as_str()).or_insert(doc);
    }
    index
}

/// Outcome of rebuilding the mapping from the remote inventory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemoteJoin {
    pub set: MappingSet,
    /// Paths that found a remote document
    pub matched: Vec<String>,
    /// Paths with no remote document
    pub unmatched: Vec<String>,
}

/// Rebuild the mapping from scratch: every non-ignored local file gets the
/// doc id of the remote document titled with its path, or none.
pub fn join_remote(
    local: &MappingSet,
    remote: &[RemoteDocInfo],
    ignore_folders: &BTreeSet<String>,
) -> RemoteJoin {
    let by_title = index_by_title(remote);
    let mut join = RemoteJoin::default();

    for file in local.iter().filter(|f| !should_ignore(f, ignore_folders)) {
        let mut mapping = file.clone();
        mapping.remote_doc_id = None;
        match by_title.get(file.file_full_path.as_str()) {
            Some(doc) => {
                mapping.remote_doc_id = Some(doc.doc_id.clone());
                join.matched.push(file.file_full_path.clone());
            }
            None => join.unmatched.push(file.file_full_path.clone()),
        }
        join.set.upsert(mapping);
    }

    join
}

/// Remote work for deleting a folder.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FolderDeletePlan {
    /// Every mapped path under the folder; all are dropped from the store
    pub removed: Vec<String>,
    /// Doc ids known locally, deleted in one batch
    pub doc_ids: Vec<String>,
    /// Paths without a doc id, to be resolved by title
    pub unresolved: Vec<String>,
}

pub fn plan_folder_delete(set: &MappingSet, folder: &str) -> FolderDeletePlan {
    let mut plan = FolderDeletePlan::default();
    for mapping in set.iter().filter(|m| m.is_within(folder)) {
        plan.removed.push(mapping.file_full_path.clone());
        match &mapping.remote_doc_id {
            Some(doc_id) => plan.doc_ids.push(doc_id.clone()),
            None => plan.unresolved.push(mapping.file_full_path.clone()),
        }
    }
    plan
}

/// Doc ids of remote documents titled with any of `paths`.
pub fn resolve_titles(paths: &[String], remote: &[RemoteDocInfo]) -> Vec<String> {
    let by_title = index_by_title(remote);
    paths
        .iter()
        .filter_map(|path| by_title.get(path.as_str()).map(|doc| doc.doc_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{FileMapping, FileStatSnapshot};

    fn file(path: &str, size: u64) -> FileMapping {
        FileMapping::new(
            path,
            FileStatSnapshot {
                ctime: 1,
                mtime: 2,
                size,
            },
        )
    }

    fn set(mappings: Vec<FileMapping>) -> MappingSet {
        mappings.into_iter().collect()
    }

    fn no_ignores() -> BTreeSet<String> {
        BTreeSet::new()
    }

    // ==================== join_incremental ====================

    #[test]
    fn test_join_keeps_stored_entries_with_doc_id() {
        let stored = set(vec![file("a.md", 100).with_doc_id("doc-1")]);
        let local = set(vec![file("a.md", 150)]);

        let joined = join_incremental(&stored, &local, &no_ignores());
        let entry = joined.get("a.md").unwrap();

        assert_eq!(entry.remote_doc_id.as_deref(), Some("doc-1"));
        assert_eq!(entry.file_stat.size, 100);
    }

    #[test]
    fn test_join_adds_new_and_drops_missing() {
        let stored = set(vec![file("gone.md", 10).with_doc_id("doc-9")]);
        let local = set(vec![file("new.md", 10)]);

        let joined = join_incremental(&stored, &local, &no_ignores());

        assert!(joined.contains("new.md"));
        assert!(!joined.contains("gone.md"));
        assert!(joined.get("new.md").unwrap().remote_doc_id.is_none());
    }

    #[test]
    fn test_join_refreshes_stat_of_pending_entries() {
        let stored = set(vec![file("empty.md", 0)]);
        let local = set(vec![file("empty.md", 42)]);

        let joined = join_incremental(&stored, &local, &no_ignores());
        assert_eq!(joined.get("empty.md").unwrap().file_stat.size, 42);
    }

    #[test]
    fn test_join_excludes_ignored_files() {
        let stored = set(vec![file("archive/old.md", 10).with_doc_id("doc-1")]);
        let local = set(vec![file("archive/old.md", 10), file("notes/a.md", 10)]);
        let ignore: BTreeSet<String> = ["archive".to_string()].into();

        let joined = join_incremental(&stored, &local, &ignore);

        assert!(!joined.contains("archive/old.md"));
        assert!(joined.contains("notes/a.md"));
    }

    #[test]
    fn test_join_is_idempotent() {
        let stored = set(vec![
            file("a.md", 100).with_doc_id("doc-1"),
            file("b.md", 0),
            file("gone.md", 5),
        ]);
        let local = set(vec![file("a.md", 100), file("b.md", 0), file("c.md", 7)]);

        let once = join_incremental(&stored, &local, &no_ignores());
        let twice = join_incremental(&once, &local, &no_ignores());

        assert_eq!(once, twice);
    }

    // ==================== plan_uploads ====================

    #[test]
    fn test_plan_uploads_skips_empty_and_uploaded() {
        let joined = set(vec![
            file("done.md", 10).with_doc_id("doc-1"),
            file("empty.md", 0),
            file("todo.md", 10),
        ]);

        let plan = plan_uploads(&joined);

        assert_eq!(plan.uploads, vec!["todo.md"]);
        assert_eq!(plan.skipped_empty, vec!["empty.md"]);
    }

    // ==================== drift ====================

    #[test]
    fn test_drift_only_on_growth() {
        assert!(!has_drifted(500, 400));
        assert!(!has_drifted(500, 500));
        assert!(has_drifted(500, 501));
    }

    #[test]
    fn test_detect_drift() {
        let joined = set(vec![
            file("notes/a.md", 500).with_doc_id("doc-1"),
            file("notes/b.md", 500).with_doc_id("doc-2"),
            file("notes/c.md", 500),
        ]);
        let local = set(vec![
            file("notes/a.md", 600),
            file("notes/b.md", 300),
            file("notes/c.md", 900),
        ]);

        let drift = detect_drift(&joined, &local);

        assert_eq!(
            drift,
            vec![Drift {
                path: "notes/a.md".to_string(),
                doc_id: "doc-1".to_string(),
                recorded_size: 500,
                current_size: 600,
            }]
        );
    }

    // ==================== join_remote ====================

    #[test]
    fn test_join_remote_matches_full_path_not_file_name() {
        let local = set(vec![file("work/todo.md", 1), file("home/todo.md", 1)]);
        let remote = vec![
            RemoteDocInfo::new("doc-home", "home/todo.md"),
            RemoteDocInfo::new("doc-bare", "todo.md"),
        ];

        let join = join_remote(&local, &remote, &no_ignores());

        assert_eq!(
            join.set.get("home/todo.md").unwrap().remote_doc_id.as_deref(),
            Some("doc-home")
        );
        assert!(join.set.get("work/todo.md").unwrap().remote_doc_id.is_none());
        assert_eq!(join.matched, vec!["home/todo.md"]);
        assert_eq!(join.unmatched, vec!["work/todo.md"]);
    }

    #[test]
    fn test_join_remote_first_listed_wins() {
        let local = set(vec![file("a.md", 1)]);
        let remote = vec![
            RemoteDocInfo::new("newest", "a.md"),
            RemoteDocInfo::new("older", "a.md"),
        ];

        let join = join_remote(&local, &remote, &no_ignores());
        assert_eq!(join.set.get("a.md").unwrap().remote_doc_id.as_deref(), Some("newest"));
    }

    #[test]
    fn test_join_remote_respects_ignore_policy() {
        let local = set(vec![file("archive/a.md", 1), file("b.md", 1)]);
        let remote = vec![RemoteDocInfo::new("doc-a", "archive/a.md")];
        let ignore: BTreeSet<String> = ["archive".to_string()].into();

        let join = join_remote(&local, &remote, &ignore);

        assert_eq!(join.set.len(), 1);
        assert!(join.set.contains("b.md"));
    }

    // ==================== folder delete ====================

    #[test]
    fn test_plan_folder_delete() {
        let stored = set(vec![
            file("notes/a.md", 1).with_doc_id("doc-1"),
            file("notes/deep/b.md", 1),
            file("notes2/c.md", 1).with_doc_id("doc-3"),
            file("d.md", 1).with_doc_id("doc-4"),
        ]);

        let plan = plan_folder_delete(&stored, "notes");

        assert_eq!(plan.removed, vec!["notes/a.md", "notes/deep/b.md"]);
        assert_eq!(plan.doc_ids, vec!["doc-1"]);
        assert_eq!(plan.unresolved, vec!["notes/deep/b.md"]);
    }

    #[test]
    fn test_resolve_titles() {
        let remote = vec![
            RemoteDocInfo::new("doc-b", "notes/deep/b.md"),
            RemoteDocInfo::new("doc-x", "b.md"),
        ];
        let titles = ["notes/deep/b.md".to_string(), "missing.md".to_string()];
        let ids = resolve_titles(&titles, &remote);
        assert_eq!(ids, vec!["doc-b"]);
    }
}
