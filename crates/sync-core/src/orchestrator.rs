//! SyncOrchestrator: the top-level sync operations over one vault and one
//! remote library.
//!
//! Each operation loads the mapping, plans the work with the pure functions
//! in [`crate::reconcile`], performs the remote calls and persists the result
//! once. Operations are serialized by an async mutex so that periodic syncs,
//! manual commands and delete notifications never interleave.

use futures::lock::Mutex;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::fs::{FileSystem, FsError};
use crate::inventory::build_inventory;
use crate::mapping::{FileMapping, MappingSet, MappingStore, StoreError};
use crate::reconcile::{
    detect_drift, join_incremental, join_remote, plan_folder_delete, plan_uploads, resolve_titles,
};
use crate::remote::{fetch_all_documents, Answer, RemoteError, RemoteLibrary};
use crate::report::SyncReport;
use crate::upload::{self, upload_file, UploadError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to build local inventory: {0}")]
    Inventory(#[from] FsError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Remote library error: {0}")]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

pub type Result<T> = std::result::Result<T, SyncError>;

pub struct SyncOrchestrator<F: FileSystem, R: RemoteLibrary> {
    fs: F,
    remote: R,
    config: SyncConfig,
    store: MappingStore,
    /// Held for the whole of every top-level operation
    lock: Mutex<()>,
}

impl<F: FileSystem, R: RemoteLibrary> SyncOrchestrator<F, R> {
    pub fn new(fs: F, remote: R, config: SyncConfig) -> Self {
        let store = MappingStore::new(config.mapping_path.clone());
        Self {
            fs,
            remote,
            config,
            store,
            lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Upload every new file and forget every deleted one.
    pub async fn incremental_sync(&self) -> Result<SyncReport> {
        let _guard = self.lock.lock().await;
        let mut report = SyncReport::default();

        let local = build_inventory(&self.fs).await?;
        let set = self.incremental_pass(&local, &mut report).await?;
        self.persist(&set);

        info!("Incremental sync finished: {}", report);
        Ok(report)
    }

    /// Incremental sync followed by re-upload of every file that grew.
    pub async fn smart_sync(&self) -> Result<SyncReport> {
        let _guard = self.lock.lock().await;
        let mut report = SyncReport::default();

        let local = build_inventory(&self.fs).await?;
        let mut set = self.incremental_pass(&local, &mut report).await?;
        self.drift_pass(&mut set, &local, &mut report).await;
        self.persist(&set);

        info!("Smart sync finished: {}", report);
        Ok(report)
    }

    /// Discard the stored mapping and rebuild it from the remote inventory.
    ///
    /// Never uploads or deletes. When the remote listing fails the stored
    /// mapping is left untouched.
    pub async fn rebuild_mapping(&self) -> Result<SyncReport> {
        let _guard = self.lock.lock().await;
        let mut report = SyncReport::default();

        let local = build_inventory(&self.fs).await?;
        let remote_docs =
            fetch_all_documents(&self.remote, self.config.library_id, self.config.page_size)
                .await?;

        let join = join_remote(&local, &remote_docs, &self.config.ignore_folders);
        report.matched = join.matched;
        report.unmatched = join.unmatched;
        self.persist(&join.set);

        info!("Mapping rebuilt from {} remote document(s): {}", remote_docs.len(), report);
        Ok(report)
    }

    /// Upload one file on request and record it immediately.
    ///
    /// Unlike the batch operations, every failure is returned to the caller.
    pub async fn manual_upload(&self, path: &str) -> Result<FileMapping> {
        let _guard = self.lock.lock().await;

        let mut set = self.load_mapping(None).await?;
        let mapping = upload_file(&self.fs, &self.remote, self.config.library_id, path).await?;

        if let Some(previous) = set.upsert(mapping.clone()) {
            if let Some(old_id) = previous.remote_doc_id {
                debug!("{} replaced mapping to {}", mapping.file_full_path, old_id);
            }
        }
        self.store.save(&set)?;

        Ok(mapping)
    }

    /// Drop a deleted file from the mapping and the library.
    pub async fn remove_file(&self, path: &str) -> Result<SyncReport> {
        let _guard = self.lock.lock().await;
        let mut report = SyncReport::default();

        let mut set = self.load_mapping(None).await?;
        self.remove_file_entry(&mut set, path, &mut report).await;
        if report.has_changes() {
            self.persist(&set);
        }
        Ok(report)
    }

    /// Drop every file under a deleted folder from the mapping and the library.
    pub async fn remove_folder(&self, folder: &str) -> Result<SyncReport> {
        let _guard = self.lock.lock().await;
        let mut report = SyncReport::default();

        let mut set = self.load_mapping(None).await?;
        self.remove_folder_entries(&mut set, folder, &mut report).await;
        if report.has_changes() {
            self.persist(&set);
        }
        Ok(report)
    }

    /// Handle a delete notification for a path that can no longer be stat'ed.
    ///
    /// A path with its own mapping entry is a file; anything else is treated
    /// as a folder, which is a no-op when nothing is mapped under it. The
    /// vault root is never treated as deleted.
    pub async fn on_path_deleted(&self, path: &str) -> Result<SyncReport> {
        let _guard = self.lock.lock().await;
        let mut report = SyncReport::default();
        let path = path.trim_matches('/');

        let mut set = self.load_mapping(None).await?;
        if set.contains(path) {
            self.remove_file_entry(&mut set, path, &mut report).await;
        } else {
            self.remove_folder_entries(&mut set, path, &mut report).await;
        }
        if report.has_changes() {
            self.persist(&set);
        }
        Ok(report)
    }

    /// Ask the library a question with the configured model.
    pub async fn ask(&self, query: &str) -> Result<Answer> {
        let answer = self
            .remote
            .ask(self.config.library_id, query, &self.config.model)
            .await?;
        Ok(answer)
    }

    /// Load the stored mapping, initializing it from the vault when missing
    /// or empty and recovering once from a corrupted file.
    ///
    /// `local` is reused as the initial inventory when the caller already
    /// built one; otherwise the vault is only walked if initialization is
    /// needed.
    async fn load_mapping(&self, local: Option<&MappingSet>) -> Result<MappingSet> {
        if self.store.needs_init()? {
            self.initialize_store(local).await?;
        }

        match self.store.load() {
            Err(StoreError::CorruptState { path, source }) => {
                warn!(
                    "Mapping file {} is corrupted ({}), starting over from the vault",
                    path.display(),
                    source
                );
                self.store.backup_corrupt()?;
                self.initialize_store(local).await?;
                Ok(self.store.load()?)
            }
            other => Ok(other?),
        }
    }

    async fn initialize_store(&self, local: Option<&MappingSet>) -> Result<()> {
        match local {
            Some(inventory) => {
                self.store.ensure_initialized(inventory)?;
            }
            None => {
                let inventory = build_inventory(&self.fs).await?;
                self.store.ensure_initialized(&inventory)?;
            }
        }
        Ok(())
    }

    async fn incremental_pass(
        &self,
        local: &MappingSet,
        report: &mut SyncReport,
    ) -> Result<MappingSet> {
        let stored = self.load_mapping(Some(local)).await?;
        let mut set = join_incremental(&stored, local, &self.config.ignore_folders);

        report.removed.extend(
            stored
                .paths()
                .filter(|path| !set.contains(path))
                .map(str::to_string),
        );

        let plan = plan_uploads(&set);
        for path in &plan.skipped_empty {
            debug!("Skipping empty file {}", path);
        }
        report.skipped_empty = plan.skipped_empty;

        for (path, result) in self.upload_batch(plan.uploads).await {
            match result {
                Ok(mapping) => {
                    set.upsert(mapping);
                    report.uploaded.push(path);
                }
                Err(e) => {
                    warn!("Failed to upload {}: {}", path, e);
                    report.failed.push(path);
                }
            }
        }

        Ok(set)
    }

    /// Re-upload files that grew, then delete the documents they replace.
    ///
    /// The upload goes first and the old document is only deleted once its
    /// replacement exists, so a failed re-upload keeps the stale entry and its
    /// document, and the file is never left without a document. A failed
    /// delete leaves the old document orphaned in the library.
    async fn drift_pass(
        &self,
        set: &mut MappingSet,
        local: &MappingSet,
        report: &mut SyncReport,
    ) {
        let drift = detect_drift(set, local);
        if drift.is_empty() {
            return;
        }
        for d in &drift {
            info!(
                "{} grew from {} to {} bytes, re-uploading",
                d.path, d.recorded_size, d.current_size
            );
        }

        let paths = drift.iter().map(|d| d.path.clone()).collect();
        let mut superseded = Vec::new();
        for (path, result) in self.upload_batch(paths).await {
            match result {
                Ok(mapping) => {
                    if let Some(old_id) = set.upsert(mapping).and_then(|old| old.remote_doc_id) {
                        superseded.push((path.clone(), old_id));
                    }
                    report.reuploaded.push(path);
                }
                Err(e) => {
                    warn!("Failed to re-upload {}, keeping previous document: {}", path, e);
                    report.failed.push(path);
                }
            }
        }

        for (path, doc_id) in superseded {
            match self
                .remote
                .delete_documents(std::slice::from_ref(&doc_id), self.config.library_id)
                .await
            {
                Ok(()) => report.deleted_remote.push(doc_id),
                Err(e) => warn!(
                    "Failed to delete superseded document {} of {}, left orphaned: {}",
                    doc_id, path, e
                ),
            }
        }
    }

    /// Upload `paths` with at most `upload_concurrency` requests in flight.
    ///
    /// Results are returned in path order regardless of completion order.
    async fn upload_batch(&self, paths: Vec<String>) -> Vec<(String, upload::Result<FileMapping>)> {
        let fs = &self.fs;
        let remote = &self.remote;
        let library_id = self.config.library_id;

        let mut results: Vec<_> = stream::iter(paths)
            .map(|path| async move {
                let result = upload_file(fs, remote, library_id, &path).await;
                (path, result)
            })
            .buffer_unordered(self.config.upload_concurrency.max(1))
            .collect()
            .await;

        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    async fn remove_file_entry(&self, set: &mut MappingSet, path: &str, report: &mut SyncReport) {
        let path = path.trim_matches('/');

        let doc_id = match set.get(path).and_then(|m| m.remote_doc_id.clone()) {
            Some(doc_id) => Some(doc_id),
            None => self
                .find_by_titles(&[path.to_string()])
                .await
                .into_iter()
                .next(),
        };

        if let Some(doc_id) = doc_id {
            self.delete_remote(vec![doc_id], report).await;
        }
        if set.remove(path).is_some() {
            info!("Removed {} from mapping", path);
            report.removed.push(path.to_string());
        }
    }

    async fn remove_folder_entries(
        &self,
        set: &mut MappingSet,
        folder: &str,
        report: &mut SyncReport,
    ) {
        if folder.trim_matches('/').is_empty() {
            warn!("Refusing to delete the vault root");
            return;
        }

        let plan = plan_folder_delete(set, folder);
        if plan.removed.is_empty() {
            debug!("Nothing mapped under {}", folder);
            return;
        }

        let mut doc_ids = plan.doc_ids;
        if !plan.unresolved.is_empty() {
            doc_ids.extend(self.find_by_titles(&plan.unresolved).await);
        }
        doc_ids.sort();
        doc_ids.dedup();

        if !doc_ids.is_empty() {
            self.delete_remote(doc_ids, report).await;
        }
        for path in plan.removed {
            set.remove(&path);
            report.removed.push(path);
        }
        info!("Removed {} file(s) under {} from mapping", report.removed.len(), folder);
    }

    /// Look up remote documents by title. A failed listing resolves nothing.
    async fn find_by_titles(&self, paths: &[String]) -> Vec<String> {
        match fetch_all_documents(&self.remote, self.config.library_id, self.config.page_size).await
        {
            Ok(docs) => resolve_titles(paths, &docs),
            Err(e) => {
                warn!("Failed to list remote documents: {}", e);
                Vec::new()
            }
        }
    }

    async fn delete_remote(&self, doc_ids: Vec<String>, report: &mut SyncReport) {
        match self
            .remote
            .delete_documents(&doc_ids, self.config.library_id)
            .await
        {
            Ok(()) => {
                debug!("Deleted {} remote document(s)", doc_ids.len());
                report.deleted_remote.extend(doc_ids);
            }
            Err(e) => warn!("Failed to delete remote documents {:?}: {}", doc_ids, e),
        }
    }

    /// Best-effort save: the in-memory result stands even when the write fails.
    fn persist(&self, set: &MappingSet) {
        if let Err(e) = self.store.save(set) {
            error!("Failed to save mapping: {}", e);
        }
    }
}
