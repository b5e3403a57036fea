//! RemoteLibrary trait for the knowledge-base service.
//!
//! Implementations:
//! - `InMemoryLibrary` - For testing
//! - `HttpLibrary` (in sync-daemon) - Uses reqwest

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Library API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// One document held by the remote library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocInfo {
    pub doc_id: String,
    /// Vault path of the file at upload time
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gmt_create: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gmt_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u64>,
}

impl RemoteDocInfo {
    pub fn new(doc_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            title: title.into(),
            file_type: None,
            gmt_create: None,
            gmt_modified: None,
            status_code: None,
            total_tokens: None,
        }
    }
}

/// One page of a document listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocPage {
    #[serde(default)]
    pub records: Vec<RemoteDocInfo>,
    #[serde(default)]
    pub total_pages: u32,
}

/// Document cited by an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferDocument {
    pub doc_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Answer returned by `ask`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub documents: Vec<ReferDocument>,
}

/// Remote knowledge-base service.
#[async_trait]
pub trait RemoteLibrary: Send + Sync {
    /// Create a document from text, returning its id
    async fn create_document(&self, library_id: u64, text: &str, title: &str) -> Result<String>;

    /// List one page of documents (pages start at 1)
    async fn list_documents(&self, library_id: u64, page: u32, page_size: u32) -> Result<DocPage>;

    /// Delete documents by id
    async fn delete_documents(&self, doc_ids: &[String], library_id: u64) -> Result<()>;

    /// Ask a question against the library
    async fn ask(&self, library_id: u64, query: &str, model: &str) -> Result<Answer>;
}

/// Page through the whole library.
pub async fn fetch_all_documents<R: RemoteLibrary + ?Sized>(
    remote: &R,
    library_id: u64,
    page_size: u32,
) -> Result<Vec<RemoteDocInfo>> {
    let first = remote.list_documents(library_id, 1, page_size).await?;
    let total_pages = first.total_pages;
    let mut docs = first.records;

    for page in 2..=total_pages {
        let next = remote.list_documents(library_id, page, page_size).await?;
        docs.extend(next.records);
    }

    debug!("Remote inventory: {} document(s) over {} page(s)", docs.len(), total_pages);
    Ok(docs)
}

#[derive(Default)]
struct LibraryState {
    docs: BTreeMap<String, RemoteDocInfo>,
    next_id: u64,
    failing_titles: HashSet<String>,
    fail_creates: bool,
    fail_deletes: bool,
    fail_lists: bool,
    created_titles: Vec<String>,
    delete_calls: Vec<Vec<String>>,
    list_calls: usize,
}

/// In-memory library for testing.
///
/// Issues ids `doc-1`, `doc-2`, ... and records every call so tests can
/// assert on remote traffic. Failures can be injected per title or per
/// operation.
#[derive(Default)]
pub struct InMemoryLibrary {
    state: Mutex<LibraryState>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document as if it had been uploaded earlier.
    pub fn insert(&self, doc_id: &str, title: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .docs
            .insert(doc_id.to_string(), RemoteDocInfo::new(doc_id, title));
    }

    /// Make uploads with this title fail.
    pub fn fail_title(&self, title: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_titles
            .insert(title.to_string());
    }

    /// Clear every injected failure.
    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.failing_titles.clear();
        state.fail_creates = false;
        state.fail_deletes = false;
        state.fail_lists = false;
    }

    pub fn set_fail_creates(&self, fail: bool) {
        self.state.lock().unwrap().fail_creates = fail;
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.state.lock().unwrap().fail_deletes = fail;
    }

    pub fn set_fail_lists(&self, fail: bool) {
        self.state.lock().unwrap().fail_lists = fail;
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.state.lock().unwrap().docs.contains_key(doc_id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Titles of every stored document, sorted.
    pub fn titles(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut titles: Vec<_> = state.docs.values().map(|d| d.title.clone()).collect();
        titles.sort();
        titles
    }

    /// Titles passed to every create call, including failed ones.
    pub fn created_titles(&self) -> Vec<String> {
        self.state.lock().unwrap().created_titles.clone()
    }

    /// Id batches passed to every delete call, including failed ones.
    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().delete_calls.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }
}

#[async_trait]
impl RemoteLibrary for InMemoryLibrary {
    async fn create_document(&self, _library_id: u64, text: &str, title: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.created_titles.push(title.to_string());

        if state.fail_creates || state.failing_titles.contains(title) {
            return Err(RemoteError::Api {
                code: 500,
                message: format!("upload rejected: {}", title),
            });
        }
        if text.is_empty() {
            return Err(RemoteError::Api {
                code: 400,
                message: "empty document".to_string(),
            });
        }

        state.next_id += 1;
        let doc_id = format!("doc-{}", state.next_id);
        state
            .docs
            .insert(doc_id.clone(), RemoteDocInfo::new(doc_id.clone(), title));
        Ok(doc_id)
    }

    async fn list_documents(&self, _library_id: u64, page: u32, page_size: u32) -> Result<DocPage> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.fail_lists {
            return Err(RemoteError::Transport("listing unavailable".to_string()));
        }

        let page_size = page_size.max(1) as usize;
        let total = state.docs.len();
        let total_pages = total.div_ceil(page_size) as u32;
        let skip = (page.max(1) as usize - 1) * page_size;
        let records = state
            .docs
            .values()
            .skip(skip)
            .take(page_size)
            .cloned()
            .collect();
        Ok(DocPage {
            records,
            total_pages,
        })
    }

    async fn delete_documents(&self, doc_ids: &[String], _library_id: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls.push(doc_ids.to_vec());
        if state.fail_deletes {
            return Err(RemoteError::Transport("delete unavailable".to_string()));
        }
        for doc_id in doc_ids {
            state.docs.remove(doc_id);
        }
        Ok(())
    }

    async fn ask(&self, _library_id: u64, query: &str, _model: &str) -> Result<Answer> {
        let state = self.state.lock().unwrap();
        let documents = state
            .docs
            .values()
            .filter(|d| d.title.contains(query))
            .map(|d| ReferDocument {
                doc_id: d.doc_id.clone(),
                title: d.title.clone(),
                url: None,
            })
            .collect();
        Ok(Answer {
            success: true,
            answer: format!("{} document(s) in library", state.docs.len()),
            documents,
        })
    }
}
