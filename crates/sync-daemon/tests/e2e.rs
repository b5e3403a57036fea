//! End-to-end tests for the library-sync daemon.
//!
//! Tests the full stack on a real directory: NativeFs inventory, the
//! orchestrator, the on-disk mapping file, the HTTP client against a mock
//! library service, and the delete watcher.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use library_sync_core::remote::RemoteLibrary;
use library_sync_core::{InMemoryLibrary, MappingStore, SyncConfig, SyncOrchestrator};
use library_sync_daemon::config::{MAPPING_FILE, STATE_DIR};
use library_sync_daemon::{DeleteWatcher, HttpLibrary, NativeFs};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::time::timeout;

const API_KEY: &str = "test-key";

// ============================================================================
// Mock library service
// ============================================================================

#[derive(Default)]
struct MockLibrary {
    docs: BTreeMap<String, String>,
    next_id: u64,
    bodies: Vec<Value>,
}

type MockState = Arc<Mutex<MockLibrary>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("Api-Key").and_then(|v| v.to_str().ok()) == Some(API_KEY)
}

fn rejected() -> Json<Value> {
    Json(json!({"success": false, "errorCode": 401, "message": "invalid api key"}))
}

async fn create_by_text(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    if !authorized(&headers) {
        return rejected();
    }
    let mut state = state.lock().unwrap();
    state.bodies.push(body.clone());
    state.next_id += 1;
    let doc_id = format!("remote-{}", state.next_id);
    let title = body["title"].as_str().unwrap_or_default().to_string();
    state.docs.insert(doc_id.clone(), title);
    Json(json!({"success": true, "errorCode": 0, "data": doc_id}))
}

async fn list_documents(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    if !authorized(&headers) {
        return rejected();
    }
    let state = state.lock().unwrap();
    let page: usize = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let page_size: usize = params
        .get("pageSize")
        .and_then(|p| p.parse().ok())
        .unwrap_or(10);
    let total_pages = state.docs.len().div_ceil(page_size);
    let records: Vec<Value> = state
        .docs
        .iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .map(|(id, title)| json!({"docId": id, "title": title, "fileType": "text"}))
        .collect();
    Json(json!({
        "success": true,
        "errorCode": 0,
        "data": {"records": records, "totalPages": total_pages}
    }))
}

async fn delete_documents(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    if !authorized(&headers) {
        return rejected();
    }
    let mut state = state.lock().unwrap();
    state.bodies.push(body.clone());
    for id in body["docIds"].as_array().into_iter().flatten() {
        if let Some(id) = id.as_str() {
            state.docs.remove(id);
        }
    }
    Json(json!({"success": true, "errorCode": 0, "data": null}))
}

async fn ask(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let expected = format!("Bearer {}", API_KEY);
    let bearer = headers.get("Authorization").and_then(|v| v.to_str().ok());
    if bearer != Some(expected.as_str()) {
        return Json(json!({"success": false, "errorCode": 401, "message": "unauthorized"}));
    }
    let state = state.lock().unwrap();
    let documents: Vec<Value> = state
        .docs
        .iter()
        .map(|(id, title)| json!({"docId": id, "title": title, "url": ""}))
        .collect();
    Json(json!({
        "success": true,
        "answer": format!("asked {} with {}", body["query"], body["model"]),
        "documents": documents
    }))
}

/// Start the mock service on an ephemeral port.
async fn start_mock() -> (SocketAddr, MockState) {
    let state = MockState::default();
    let app = Router::new()
        .route("/api/library/document/createByText", post(create_by_text))
        .route("/api/library/listDocument", get(list_documents))
        .route("/api/library/document/delete", post(delete_documents))
        .route("/api/library/ask", post(ask))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock service");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Mock service failed");
    });

    (addr, state)
}

fn http_library(addr: SocketAddr, api_key: &str) -> HttpLibrary {
    HttpLibrary::new(
        api_key,
        format!("http://{}/api", addr),
        format!("http://{}/api/library/ask", addr),
    )
    .expect("Failed to build client")
}

fn write(vault: &Path, path: &str, content: &str) {
    let full = vault.join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(full, content).unwrap();
}

fn mapping_path(vault: &Path) -> std::path::PathBuf {
    vault.join(STATE_DIR).join(MAPPING_FILE)
}

// ============================================================================
// HTTP client tests
// ============================================================================

#[tokio::test]
async fn test_http_library_round_trip() {
    let (addr, state) = start_mock().await;
    let library = http_library(addr, API_KEY);

    let id = library
        .create_document(7, "# Alpha", "notes/a.md")
        .await
        .expect("create failed");
    assert_eq!(id, "remote-1");

    {
        let state = state.lock().unwrap();
        let body = &state.bodies[0];
        assert_eq!(body["libraryId"], 7);
        assert_eq!(body["text"], "# Alpha");
        assert_eq!(body["title"], "notes/a.md");
        assert_eq!(body["url"], "");
    }

    let page = library.list_documents(7, 1, 100).await.expect("list failed");
    assert_eq!(page.total_pages, 1);
    assert_eq!(page.records[0].doc_id, "remote-1");
    assert_eq!(page.records[0].title, "notes/a.md");

    library
        .delete_documents(&[id], 7)
        .await
        .expect("delete failed");
    assert!(state.lock().unwrap().docs.is_empty());
}

#[tokio::test]
async fn test_http_library_reports_api_errors() {
    let (addr, _state) = start_mock().await;
    let library = http_library(addr, "wrong-key");

    let err = library
        .create_document(7, "# Alpha", "a.md")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid api key"));
}

#[tokio::test]
async fn test_http_library_ask_uses_bearer_auth() {
    let (addr, _state) = start_mock().await;
    let library = http_library(addr, API_KEY);
    library.create_document(7, "x", "notes/a.md").await.unwrap();

    let answer = library.ask(7, "what?", "gpt-3.5-turbo").await.unwrap();

    assert!(answer.success);
    assert!(answer.answer.contains("gpt-3.5-turbo"));
    assert_eq!(answer.documents.len(), 1);
}

// ============================================================================
// Orchestrator on a real vault
// ============================================================================

#[tokio::test]
async fn test_sync_real_vault_over_http() {
    let temp_dir = TempDir::new().unwrap();
    let vault = temp_dir.path();
    write(vault, "a.md", "alpha");
    write(vault, "notes/b.md", "beta");
    write(vault, "archive/old.md", "old");
    write(vault, "notes/image.png", "png");

    let (addr, state) = start_mock().await;
    let config = SyncConfig::new(7, mapping_path(vault)).with_ignore_folders(["archive"]);
    let orchestrator = SyncOrchestrator::new(
        NativeFs::new(vault.to_path_buf()),
        http_library(addr, API_KEY),
        config,
    );

    let report = orchestrator.smart_sync().await.unwrap();
    assert_eq!(report.uploaded, vec!["a.md", "notes/b.md"]);

    // The state directory lives in the vault but never syncs itself
    let stored = MappingStore::new(mapping_path(vault)).load().unwrap();
    let paths: Vec<_> = stored.paths().collect();
    assert_eq!(paths, vec!["a.md", "notes/b.md"]);

    let contents = std::fs::read_to_string(mapping_path(vault)).unwrap();
    assert!(contents.contains("\"fileFullPath\": \"notes/b.md\""));

    // Grow a file, sync again: old document replaced
    let old_id = stored.get("notes/b.md").unwrap().remote_doc_id.clone().unwrap();
    write(vault, "notes/b.md", "beta, now considerably longer");
    let report = orchestrator.smart_sync().await.unwrap();
    assert_eq!(report.reuploaded, vec!["notes/b.md"]);
    assert_eq!(report.deleted_remote, vec![old_id.clone()]);
    assert!(!state.lock().unwrap().docs.contains_key(&old_id));

    // Delete a folder from disk
    std::fs::remove_dir_all(vault.join("notes")).unwrap();
    let report = orchestrator.on_path_deleted("notes").await.unwrap();
    assert_eq!(report.removed, vec!["notes/b.md"]);

    let titles: Vec<String> = state.lock().unwrap().docs.values().cloned().collect();
    assert_eq!(titles, vec!["a.md"]);
}

#[tokio::test]
async fn test_rebuild_from_remote_on_real_vault() {
    let temp_dir = TempDir::new().unwrap();
    let vault = temp_dir.path();
    write(vault, "work/todo.md", "w");
    write(vault, "home/todo.md", "h");

    let library = InMemoryLibrary::new();
    library.insert("existing", "home/todo.md");
    let orchestrator = SyncOrchestrator::new(
        NativeFs::new(vault.to_path_buf()),
        library,
        SyncConfig::new(7, mapping_path(vault)),
    );

    let report = orchestrator.rebuild_mapping().await.unwrap();

    assert_eq!(report.matched, vec!["home/todo.md"]);
    assert_eq!(report.unmatched, vec!["work/todo.md"]);
    assert!(orchestrator.remote().created_titles().is_empty());
}

#[tokio::test]
async fn test_corrupted_mapping_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let vault = temp_dir.path();
    write(vault, "a.md", "alpha");
    write(vault, &format!("{}/{}", STATE_DIR, MAPPING_FILE), "{not json");

    let orchestrator = SyncOrchestrator::new(
        NativeFs::new(vault.to_path_buf()),
        InMemoryLibrary::new(),
        SyncConfig::new(7, mapping_path(vault)),
    );
    orchestrator.incremental_sync().await.unwrap();

    let backup = vault.join(STATE_DIR).join(format!("{}.bak", MAPPING_FILE));
    assert_eq!(std::fs::read_to_string(backup).unwrap(), "{not json");
    let stored = MappingStore::new(mapping_path(vault)).load().unwrap();
    assert!(stored.get("a.md").unwrap().has_doc_id());
}

/// A dangling symlink is listed but cannot be stat'ed; the rest still syncs.
#[cfg(unix)]
#[tokio::test]
async fn test_dangling_symlink_does_not_abort_sync() {
    let temp_dir = TempDir::new().unwrap();
    let vault = temp_dir.path();
    write(vault, "a.md", "alpha");
    std::os::unix::fs::symlink(vault.join("nowhere.md"), vault.join("broken.md")).unwrap();

    let orchestrator = SyncOrchestrator::new(
        NativeFs::new(vault.to_path_buf()),
        InMemoryLibrary::new(),
        SyncConfig::new(7, mapping_path(vault)),
    );

    let report = orchestrator.smart_sync().await.unwrap();

    assert_eq!(report.uploaded, vec!["a.md"]);
    assert!(report.failed.is_empty());
    assert_eq!(orchestrator.remote().titles(), vec!["a.md"]);
    let stored = MappingStore::new(mapping_path(vault)).load().unwrap();
    let paths: Vec<_> = stored.paths().collect();
    assert_eq!(paths, vec!["a.md"]);
}

// ============================================================================
// Delete watcher tests
// ============================================================================

/// Test that the watcher reports deleted files.
#[tokio::test]
async fn test_delete_watcher_reports_deletions() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let vault_path = temp_dir.path().to_path_buf();
    let test_file = vault_path.join("gone.md");
    std::fs::write(&test_file, "# Soon gone").expect("Failed to write file");

    let mut watcher = DeleteWatcher::new(vault_path.clone()).expect("Failed to create watcher");

    // Give watcher time to fully initialize - FSEvents on macOS needs time
    tokio::time::sleep(Duration::from_millis(500)).await;

    std::fs::remove_file(&test_file).expect("Failed to delete file");

    let event = timeout(Duration::from_secs(10), watcher.event_rx().recv())
        .await
        .expect("Timeout waiting for delete event")
        .expect("No event received");

    assert_eq!(event.path, "gone.md");
}

/// Test that the watcher ignores writes and hidden paths.
#[tokio::test]
async fn test_delete_watcher_ignores_writes_and_hidden_paths() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let vault_path = temp_dir.path().to_path_buf();
    let state_dir = vault_path.join(STATE_DIR);
    std::fs::create_dir_all(&state_dir).expect("Failed to create state dir");
    std::fs::write(state_dir.join("scratch.json"), "{}").expect("Failed to write state file");
    let test_file = vault_path.join("target.md");
    std::fs::write(&test_file, "# Target").expect("Failed to write file");

    let mut watcher = DeleteWatcher::new(vault_path.clone()).expect("Failed to create watcher");
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Neither of these should produce an event
    std::fs::write(vault_path.join("new.md"), "# New").expect("Failed to write file");
    std::fs::remove_file(state_dir.join("scratch.json")).expect("Failed to delete state file");

    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::remove_file(&test_file).expect("Failed to delete file");

    let event = timeout(Duration::from_secs(10), watcher.event_rx().recv())
        .await
        .expect("Timeout waiting for delete event")
        .expect("No event received");

    assert_eq!(event.path, "target.md", "Should only report target.md");
}
