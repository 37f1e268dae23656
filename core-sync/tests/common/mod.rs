//! Recording fakes of the remote stores plus a vault/orchestrator harness.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::LocalSourceStore;
use bridge_traits::{BridgeError, FixedClock, HtmlStore, StructuredStore};
use bytes::Bytes;
use chrono::DateTime;
use core_document::Block;
use core_runtime::config::{HtmlUpdateStrategy, RouteConfig, SyncSettings};
use core_runtime::events::{CoreEvent, EventBus};
use core_sync::{
    create_test_pool, RouteStores, SqliteSyncRecordRepository, SyncOrchestrator,
    SyncRecordRepository,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

type BridgeResult<T> = bridge_traits::error::Result<T>;

// ============================================================================
// Structured store
// ============================================================================

#[derive(Default)]
pub struct StructuredState {
    pub pages: HashMap<String, (String, Vec<Block>)>,
    /// Parent given when each page was created.
    pub parents: HashMap<String, Option<String>>,
    pub uploads: Vec<PathBuf>,
    pub calls: Vec<String>,
    next_page: usize,
}

/// Keeps pages in memory and hands out numbered hosted addresses.
#[derive(Default)]
pub struct FakeStructuredStore {
    pub state: Mutex<StructuredState>,
}

impl FakeStructuredStore {
    pub fn calls(&self, name: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.iter().filter(|c| c.as_str() == name).count()
    }

    pub fn page(&self, page_id: &str) -> Option<Vec<Block>> {
        let state = self.state.lock().unwrap();
        state.pages.get(page_id).map(|(_, blocks)| blocks.clone())
    }
}

#[async_trait]
impl StructuredStore for FakeStructuredStore {
    async fn create_page(
        &self,
        parent: Option<&str>,
        title: &str,
        blocks: &[Block],
    ) -> BridgeResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("create_page".into());
        state.next_page += 1;
        let id = format!("page-{}", state.next_page);
        state
            .parents
            .insert(id.clone(), parent.map(str::to_string));
        state
            .pages
            .insert(id.clone(), (title.to_string(), blocks.to_vec()));
        Ok(id)
    }

    async fn replace_page_content(&self, page_id: &str, blocks: &[Block]) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("replace_page_content".into());
        match state.pages.get_mut(page_id) {
            Some(page) => {
                page.1 = blocks.to_vec();
                Ok(())
            }
            None => Err(BridgeError::NotFound(page_id.to_string())),
        }
    }

    async fn fetch_blocks(&self, page_id: &str) -> BridgeResult<Vec<Block>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("fetch_blocks".into());
        state
            .pages
            .get(page_id)
            .map(|(_, blocks)| blocks.clone())
            .ok_or_else(|| BridgeError::NotFound(page_id.to_string()))
    }

    async fn upload_media(&self, file: &Path) -> BridgeResult<String> {
        std::fs::metadata(file)?;
        let mut state = self.state.lock().unwrap();
        state.calls.push("upload_media".into());
        state.uploads.push(file.to_path_buf());
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!(
            "https://files.example/upload/{}/{}",
            state.uploads.len(),
            name
        ))
    }
}

// ============================================================================
// HTML store
// ============================================================================

#[derive(Default)]
pub struct HtmlState {
    pub docs: HashMap<String, (String, String)>,
    /// Folder given when each document was created.
    pub folders: HashMap<String, Option<String>>,
    pub blobs: HashMap<(String, String), Bytes>,
    pub calls: Vec<String>,
    pub deleted: Vec<String>,
    /// Documents reported as linking to any document.
    pub backlinks: Vec<String>,
    pub rewritten: Vec<(String, String, String)>,
    pub fail_rewrite: bool,
    next_doc: usize,
    next_blob: usize,
}

/// Keeps documents and blobs in memory; blobs only attach to existing documents.
#[derive(Default)]
pub struct FakeHtmlStore {
    pub state: Mutex<HtmlState>,
}

impl FakeHtmlStore {
    pub fn calls(&self, name: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.calls.iter().filter(|c| c.as_str() == name).count()
    }

    pub fn html(&self, doc_id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.docs.get(doc_id).map(|(_, html)| html.clone())
    }

    pub fn set_html(&self, doc_id: &str, html: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(doc) = state.docs.get_mut(doc_id) {
            doc.1 = html.to_string();
        }
    }

    pub fn put_blob(&self, doc_id: &str, blob_id: &str, bytes: &'static [u8]) {
        let mut state = self.state.lock().unwrap();
        state.blobs.insert(
            (doc_id.to_string(), blob_id.to_string()),
            Bytes::from_static(bytes),
        );
    }
}

#[async_trait]
impl HtmlStore for FakeHtmlStore {
    async fn create_document(
        &self,
        folder: Option<&str>,
        title: &str,
        html: &str,
    ) -> BridgeResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("create_document".into());
        state.next_doc += 1;
        let id = format!("doc-{}", state.next_doc);
        state
            .folders
            .insert(id.clone(), folder.map(str::to_string));
        state
            .docs
            .insert(id.clone(), (title.to_string(), html.to_string()));
        Ok(id)
    }

    async fn replace_document(&self, doc_id: &str, html: &str) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("replace_document".into());
        match state.docs.get_mut(doc_id) {
            Some(doc) => {
                doc.1 = html.to_string();
                Ok(())
            }
            None => Err(BridgeError::NotFound(doc_id.to_string())),
        }
    }

    async fn fetch_document(&self, doc_id: &str) -> BridgeResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("fetch_document".into());
        state
            .docs
            .get(doc_id)
            .map(|(_, html)| html.clone())
            .ok_or_else(|| BridgeError::NotFound(doc_id.to_string()))
    }

    async fn upload_blob(&self, doc_id: &str, file: &Path) -> BridgeResult<String> {
        let bytes = std::fs::read(file)?;
        let mut state = self.state.lock().unwrap();
        state.calls.push("upload_blob".into());
        if !state.docs.contains_key(doc_id) {
            return Err(BridgeError::NotFound(doc_id.to_string()));
        }
        state.next_blob += 1;
        let id = format!("blob-{}", state.next_blob);
        state
            .blobs
            .insert((doc_id.to_string(), id.clone()), Bytes::from(bytes));
        Ok(id)
    }

    async fn download_blob(&self, doc_id: &str, blob: &str) -> BridgeResult<Bytes> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("download_blob".into());
        state
            .blobs
            .get(&(doc_id.to_string(), blob.to_string()))
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("{}/{}", doc_id, blob)))
    }

    async fn delete_document(&self, doc_id: &str) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("delete_document".into());
        state
            .docs
            .remove(doc_id)
            .ok_or_else(|| BridgeError::NotFound(doc_id.to_string()))?;
        state.deleted.push(doc_id.to_string());
        Ok(())
    }

    async fn find_backlinks(&self, doc_id: &str) -> BridgeResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("find_backlinks".into());
        Ok(state
            .backlinks
            .iter()
            .filter(|linking| linking.as_str() != doc_id)
            .cloned()
            .collect())
    }

    async fn rewrite_backlinks(
        &self,
        linking_doc: &str,
        old_id: &str,
        new_id: &str,
    ) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("rewrite_backlinks".into());
        if state.fail_rewrite {
            return Err(BridgeError::OperationFailed(format!(
                "cannot edit {}",
                linking_doc
            )));
        }
        state.rewritten.push((
            linking_doc.to_string(),
            old_id.to_string(),
            new_id.to_string(),
        ));
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub const ROUTE: &str = "notes";
pub const PARENT_PAGE: &str = "page-root";
pub const HTML_FOLDER: &str = "folder-notes";

pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(
        DateTime::from_timestamp_millis(1_760_000_000_000).unwrap(),
    ))
}

/// A temporary vault registered as route `notes` against fresh fakes.
pub struct Harness {
    pub vault: TempDir,
    pub staging: TempDir,
    pub structured: Arc<FakeStructuredStore>,
    pub html: Arc<FakeHtmlStore>,
    pub repository: Arc<SqliteSyncRecordRepository>,
    pub events: EventBus,
    pub orchestrator: SyncOrchestrator,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_strategy(HtmlUpdateStrategy::Replace).await
    }

    pub async fn with_strategy(strategy: HtmlUpdateStrategy) -> Self {
        let vault = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let settings = SyncSettings::default()
            .with_html_update_strategy(strategy)
            .with_staging_dir(staging.path());
        Self::build(vault, staging, settings).await
    }

    pub async fn build(vault: TempDir, staging: TempDir, settings: SyncSettings) -> Self {
        let structured = Arc::new(FakeStructuredStore::default());
        let html = Arc::new(FakeHtmlStore::default());
        let repository = Arc::new(SqliteSyncRecordRepository::new(
            create_test_pool().await.unwrap(),
        ));

        let events = EventBus::new(256);
        let mut orchestrator = SyncOrchestrator::new(
            settings,
            repository.clone() as Arc<dyn SyncRecordRepository>,
        )
        .unwrap()
        .with_clock(fixed_clock())
        .with_event_bus(events.clone());
        orchestrator
            .register_route(
                RouteConfig::new(ROUTE, vault.path())
                    .with_structured_parent(PARENT_PAGE)
                    .with_html_folder(HTML_FOLDER),
                RouteStores {
                    source: Arc::new(LocalSourceStore::new()),
                    structured: structured.clone(),
                    html: html.clone(),
                },
            )
            .unwrap();

        Self {
            vault,
            staging,
            structured,
            html,
            repository,
            events,
            orchestrator,
        }
    }

    pub fn write(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.vault.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn stores(&self) -> RouteStores {
        RouteStores {
            source: Arc::new(LocalSourceStore::new()),
            structured: self.structured.clone(),
            html: self.html.clone(),
        }
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.vault.path().join(relative)).unwrap()
    }
}

/// Drains every event published so far on `receiver`.
pub fn drain(receiver: &mut tokio::sync::broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
