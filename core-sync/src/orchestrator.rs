//! # Sync Orchestrator
//!
//! Drives one document through the Markdown → structured store → HTML store
//! pipeline, or back again.
//!
//! ## Overview
//!
//! The `SyncOrchestrator` owns the create-vs-update decision, media upload and
//! rewriting between the three addressing schemes, and the recreation policy
//! for HTML-store documents. Each call walks the stages of
//! [`SyncRun`](crate::stage::SyncRun) in order:
//!
//! ### Forward
//! 1. Read the Markdown document from the vault
//! 2. Parse Markdown into blocks, then resolve the media blocks' references
//!    (unresolved ones become warnings)
//! 3. Upload each resolved file once to the structured store
//!    ((notation, target) → hosted address)
//! 4. Rewrite media references
//! 5. Create or replace the structured-store page
//! 6. Fetch the page back in the store's canonical form
//! 7. Attach media to the HTML document as blobs (hosted address → blob id),
//!    reusing blobs whose file hash is unchanged
//! 8. Rewrite and render HTML
//! 9. Create, replace, or recreate the HTML document
//! 10. Persist the sync record
//!
//! ### Reverse
//! The same stages with the HTML store as the source: blobs are downloaded,
//! uploaded to the structured store, and finally written beside the Markdown
//! document under the media output folder.
//!
//! ## Failure semantics
//!
//! Any failing external call aborts the sync with the originating error. Nothing
//! is retried and nothing already written is rolled back. The sync record is
//! only written after the final publish, except for the recreation checkpoint.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{Direction, RouteStores, SyncOrchestrator};
//!
//! let mut orchestrator = SyncOrchestrator::new(settings, repository)?;
//! orchestrator.register_route(route_config, RouteStores { source, structured, html })?;
//!
//! let outcome = orchestrator
//!     .sync(Path::new("/vault/notes/daily.md"), "notes", Direction::Forward)
//!     .await?;
//! for warning in &outcome.warnings {
//!     println!("warning: {}", warning);
//! }
//! ```

use crate::error::RemoteOperation;
use crate::record::{content_hash, hash_bytes, MediaRecord, PendingRecreation, SyncRecord};
use crate::repository::SyncRecordRepository;
use crate::stage::{Direction, SyncRun, SyncRunId, SyncStage};
use crate::{Result, SyncError};
use bridge_traits::{
    BridgeError, Clock, HtmlStore, MediaFile, SourceStore, StructuredStore, SystemClock,
};
use bytes::Bytes;
use core_document::{
    html, markdown, rewrite, title_from_blocks, Block, HtmlTarget, MediaKind, MediaMapping,
};
use core_media::{is_url, MediaResolver, MediaSyntax, Notation, ResolverConfig};
use core_runtime::config::{HtmlUpdateStrategy, RouteConfig, SyncSettings};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_runtime::logging::redact_url;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Public Types
// ============================================================================

/// The three stores a route syncs between.
#[derive(Clone)]
pub struct RouteStores {
    pub source: Arc<dyn SourceStore>,
    pub structured: Arc<dyn StructuredStore>,
    pub html: Arc<dyn HtmlStore>,
}

/// One entry of a batch sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub path: PathBuf,
    pub route: String,
    pub direction: Direction,
}

impl SyncRequest {
    pub fn new(path: impl Into<PathBuf>, route: impl Into<String>, direction: Direction) -> Self {
        Self {
            path: path.into(),
            route: route.into(),
            direction,
        }
    }
}

/// A recoverable problem that did not stop the sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncWarning {
    /// A media reference matched no file; it was left as written.
    UnresolvedMedia { reference: String },
    /// The HTML store no longer has a referenced blob; it was left as written.
    MissingBlob { reference: String },
    /// An earlier recreation still needs manual reconciliation.
    RecreationPending {
        previous_id: String,
        replacement_id: String,
    },
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncWarning::UnresolvedMedia { reference } => {
                write!(f, "media reference {} did not resolve to a file", reference)
            }
            SyncWarning::MissingBlob { reference } => {
                write!(f, "blob {} is missing from the HTML store", reference)
            }
            SyncWarning::RecreationPending {
                previous_id,
                replacement_id,
            } => write!(
                f,
                "document {} was replaced by {} but the recreation was never confirmed",
                previous_id, replacement_id
            ),
        }
    }
}

/// Result of a successful sync call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub run_id: SyncRunId,
    pub route: String,
    pub relative_path: String,
    pub direction: Direction,
    /// Destinations were created rather than updated.
    pub created: bool,
    pub structured_id: String,
    pub html_id: String,
    pub content_hash: String,
    /// Uploads performed across both legs.
    pub media_uploaded: usize,
    /// HTML-store blobs reused from an earlier sync.
    pub media_reused: usize,
    pub warnings: Vec<SyncWarning>,
}

/// Sync state of a document on one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentStatus {
    pub route: String,
    pub relative_path: String,
    /// `None` until the first successful sync.
    pub record: Option<SyncRecord>,
}

// ============================================================================
// Internal Types
// ============================================================================

struct RegisteredRoute {
    config: RouteConfig,
    stores: RouteStores,
}

impl RegisteredRoute {
    fn root(&self) -> &Path {
        &self.config.source_root
    }

    fn locate(&self, path: &Path) -> Result<(PathBuf, String)> {
        locate(self.root(), path)
    }

    fn structured_parent(&self) -> Option<&str> {
        self.config.structured_parent.as_deref()
    }

    fn html_folder(&self) -> Option<&str> {
        self.config.html_folder.as_deref()
    }
}

/// Absolute document path plus its `/`-separated path relative to `root`.
fn locate(root: &Path, path: &Path) -> Result<(PathBuf, String)> {
    let outside = || SyncError::DocumentOutsideRoute {
        path: path.to_path_buf(),
        root: root.to_path_buf(),
    };

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    let relative = match absolute.strip_prefix(root) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => canonical_relative(root, &absolute).ok_or_else(outside)?,
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return Err(outside()),
        }
    }
    if parts.is_empty() {
        return Err(outside());
    }

    Ok((absolute, parts.join("/")))
}

fn canonical_relative(root: &Path, path: &Path) -> Option<PathBuf> {
    let root = root.canonicalize().ok()?;
    let path = path.canonicalize().ok()?;
    path.strip_prefix(&root).ok().map(Path::to_path_buf)
}

/// `/`-separated path of a vault file relative to `root`, or the full path
/// when the file lies outside it.
fn vault_key(root: &Path, path: &Path) -> String {
    let relative = match path.strip_prefix(root) {
        Ok(relative) => Some(relative.to_path_buf()),
        Err(_) => canonical_relative(root, path),
    };
    match relative {
        Some(relative) => relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/"),
        None => path.to_string_lossy().into_owned(),
    }
}

/// Media references as written in parsed Markdown, in document order.
fn written_media(blocks: &[Block]) -> impl Iterator<Item = MediaSyntax> + '_ {
    blocks.iter().filter_map(Block::as_media).filter_map(|media| {
        let notation = media.notation()?;
        Some(MediaSyntax::new(
            notation,
            media.reference(),
            media.caption().map(str::to_string),
        ))
    })
}

/// A vault file uploaded in forward stage 1.
struct LocalMedia {
    notation: Notation,
    target: String,
    /// Vault-relative path, the key of the file's media record.
    key: String,
    location: PathBuf,
}

/// A blob downloaded and staged in reverse stage 1.
struct StagedBlob {
    blob_id: String,
    file_name: String,
    bytes: Bytes,
}

/// Where the forward HTML leg writes.
struct HtmlPlan {
    /// Document receiving content, once it exists.
    current: Option<String>,
    /// Document to retire after a recreation.
    previous: Option<String>,
}

impl HtmlPlan {
    fn new(existing: Option<&SyncRecord>, strategy: HtmlUpdateStrategy) -> Self {
        match (existing, strategy) {
            (None, _) => Self {
                current: None,
                previous: None,
            },
            (Some(record), HtmlUpdateStrategy::Replace) => Self {
                current: Some(record.html_id.clone()),
                previous: None,
            },
            (Some(record), HtmlUpdateStrategy::Recreate) => Self {
                current: None,
                previous: Some(record.html_id.clone()),
            },
        }
    }
}

type DocumentKey = (String, String);

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs sync pipelines for registered routes.
pub struct SyncOrchestrator {
    settings: SyncSettings,
    resolver: MediaResolver,
    repository: Arc<dyn SyncRecordRepository>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
    routes: HashMap<String, Arc<RegisteredRoute>>,
    locks: Mutex<HashMap<DocumentKey, Arc<Mutex<()>>>>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator with no routes.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the settings are invalid.
    pub fn new(settings: SyncSettings, repository: Arc<dyn SyncRecordRepository>) -> Result<Self> {
        settings
            .validate()
            .map_err(|e| SyncError::Config(e.to_string()))?;
        let resolver = MediaResolver::new(
            ResolverConfig::default()
                .with_media_folders(settings.media_folders.clone())
                .with_recursive_search(settings.recursive_media_search),
        );

        Ok(Self {
            settings,
            resolver,
            repository,
            clock: Arc::new(SystemClock),
            event_bus: None,
            routes: HashMap::new(),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Registers a route and the stores it syncs between.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the route is invalid or already registered.
    pub fn register_route(&mut self, config: RouteConfig, stores: RouteStores) -> Result<()> {
        config
            .validate()
            .map_err(|e| SyncError::Config(e.to_string()))?;
        if self.routes.contains_key(&config.name) {
            return Err(SyncError::Config(format!(
                "Route '{}' is already registered",
                config.name
            )));
        }

        info!(route = %config.name, root = %config.source_root.display(), "Registered route");
        self.routes
            .insert(config.name.clone(), Arc::new(RegisteredRoute { config, stores }));
        Ok(())
    }

    /// Syncs one document.
    ///
    /// Two calls for the same (route, document) never interleave; calls for
    /// different documents run independently.
    ///
    /// # Errors
    ///
    /// - `RouteNotFound` / `RouteDisabled` / `DocumentOutsideRoute` before any I/O
    /// - `DocumentNotYetSynced` for a reverse sync without a record, before any remote call
    /// - `Remote` for the first failing external call
    /// - `RecreationInterrupted` when retiring a recreated HTML document fails
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn sync(
        &self,
        path: &Path,
        route: &str,
        direction: Direction,
    ) -> Result<SyncOutcome> {
        let registered = self.registered_route(route)?;
        let (document, relative_path) = registered.locate(path)?;

        let lock = self.document_lock(route, &relative_path).await;
        let guard = lock.lock().await;

        let mut run = SyncRun::new(route, relative_path, direction);
        self.emit_stage(&run);

        let result = match direction {
            Direction::Forward => self.sync_forward(&registered, &document, &mut run).await,
            Direction::Reverse => self.sync_reverse(&registered, &document, &mut run).await,
        };

        match &result {
            Ok(outcome) => {
                info!(
                    run_id = %run.id,
                    relative_path = %run.relative_path,
                    created = outcome.created,
                    media_uploaded = outcome.media_uploaded,
                    warnings = outcome.warnings.len(),
                    "Sync completed"
                );
                self.emit(SyncEvent::Completed {
                    run_id: run.id.to_string(),
                    route: run.route.clone(),
                    relative_path: run.relative_path.clone(),
                    direction: direction.to_string(),
                    created: outcome.created,
                    media_uploaded: outcome.media_uploaded as u64,
                    warnings: outcome.warnings.len() as u64,
                });
            }
            Err(err) => {
                let stage = run.stage();
                if run.fail().is_err() {
                    debug!(stage = %stage, "Run already terminal when failing");
                }
                warn!(
                    run_id = %run.id,
                    relative_path = %run.relative_path,
                    stage = %stage,
                    error = %err,
                    "Sync failed"
                );
                self.emit(SyncEvent::Failed {
                    run_id: run.id.to_string(),
                    route: run.route.clone(),
                    relative_path: run.relative_path.clone(),
                    stage: stage.to_string(),
                    message: err.to_string(),
                });
            }
        }

        drop(guard);
        self.release_lock(route, &run.relative_path, lock).await;
        result
    }

    /// Syncs independent documents concurrently, at most
    /// `max_concurrent_documents` at a time. Results arrive in completion order.
    pub async fn sync_batch(
        &self,
        requests: Vec<SyncRequest>,
    ) -> Vec<(SyncRequest, Result<SyncOutcome>)> {
        let limit = self.settings.max_concurrent_documents.max(1);
        info!(documents = requests.len(), limit, "Starting batch sync");

        stream::iter(requests)
            .map(|request| async move {
                let result = self
                    .sync(&request.path, &request.route, request.direction)
                    .await;
                (request, result)
            })
            .buffer_unordered(limit)
            .collect()
            .await
    }

    /// Sync state of `path` on every registered route whose root contains it.
    pub async fn status(&self, path: &Path) -> Result<Vec<DocumentStatus>> {
        let mut names: Vec<&String> = self.routes.keys().collect();
        names.sort();

        let mut statuses = Vec::new();
        for name in names {
            let registered = &self.routes[name];
            let Ok((_, relative_path)) = registered.locate(path) else {
                continue;
            };
            let record = self.repository.find(name, &relative_path).await?;
            statuses.push(DocumentStatus {
                route: name.clone(),
                relative_path,
                record,
            });
        }
        Ok(statuses)
    }

    /// Clears the recreation markers of a document after the user reconciled
    /// them, returning the cleared markers.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn acknowledge_recreation(
        &self,
        path: &Path,
        route: &str,
    ) -> Result<Vec<PendingRecreation>> {
        let registered = self.registered_route(route)?;
        let (_, relative_path) = registered.locate(path)?;

        let lock = self.document_lock(route, &relative_path).await;
        let guard = lock.lock().await;
        let result = self.clear_recreations(route, &relative_path).await;
        drop(guard);
        self.release_lock(route, &relative_path, lock).await;
        result
    }

    async fn clear_recreations(
        &self,
        route: &str,
        relative_path: &str,
    ) -> Result<Vec<PendingRecreation>> {
        let mut record = self
            .repository
            .find(route, relative_path)
            .await?
            .ok_or_else(|| SyncError::DocumentNotYetSynced {
                route: route.to_string(),
                relative_path: relative_path.to_string(),
            })?;

        let cleared = std::mem::take(&mut record.pending_recreations);
        if !cleared.is_empty() {
            self.repository.upsert(&record).await?;
            info!(
                relative_path = %relative_path,
                cleared = cleared.len(),
                "Acknowledged recreation"
            );
        }
        Ok(cleared)
    }

    // ------------------------------------------------------------------------
    // Forward
    // ------------------------------------------------------------------------

    async fn sync_forward(
        &self,
        route: &RegisteredRoute,
        document: &Path,
        run: &mut SyncRun,
    ) -> Result<SyncOutcome> {
        let stores = &route.stores;
        let existing = self.repository.find(&run.route, &run.relative_path).await?;
        let mut pending = carried_recreations(existing.as_ref());
        let mut warnings = pending_warnings(&pending);
        let mut uploaded = 0;
        let mut reused = 0;

        let source = stores
            .source
            .read_document(document)
            .await
            .map_err(SyncError::remote(RemoteOperation::ReadSource))?;
        let source_hash = content_hash(&source.content);

        self.enter(run, SyncStage::ExtractMedia)?;
        let parsed = markdown::parse(&source.content);
        let mut local_media = Vec::new();
        for reference in self
            .resolver
            .resolve_all(written_media(&parsed), document, route.root())
        {
            let syntax = reference.syntax;
            match reference.location {
                Some(location) => local_media.push(LocalMedia {
                    notation: syntax.notation,
                    target: syntax.target,
                    key: vault_key(route.root(), &location),
                    location,
                }),
                None => warnings.push(SyncWarning::UnresolvedMedia {
                    reference: syntax.raw,
                }),
            }
        }

        self.enter(run, SyncStage::UploadMediaStage1)?;
        let mut stage1 = MediaMapping::new();
        let mut hosted_by_location: HashMap<PathBuf, String> = HashMap::new();
        let mut hosted_files: HashMap<String, LocalMedia> = HashMap::new();
        for media in local_media {
            let hosted = match hosted_by_location.get(&media.location) {
                Some(hosted) => hosted.clone(),
                None => {
                    let hosted = stores
                        .structured
                        .upload_media(&media.location)
                        .await
                        .map_err(SyncError::remote(RemoteOperation::UploadMedia))?;
                    uploaded += 1;
                    debug!(
                        media = %media.key,
                        hosted = %redact_url(&hosted),
                        "Uploaded media to structured store"
                    );
                    hosted_by_location.insert(media.location.clone(), hosted.clone());
                    hosted
                }
            };
            stage1.insert_scoped(media.notation, media.target.clone(), hosted.clone());
            hosted_files.entry(hosted).or_insert(media);
        }

        self.enter(run, SyncStage::ConvertStage1)?;
        let blocks = rewrite(&parsed, &stage1);

        self.enter(run, SyncStage::PublishIntermediate)?;
        let structured_id = match &existing {
            Some(record) => {
                stores
                    .structured
                    .replace_page_content(&record.structured_id, &blocks)
                    .await
                    .map_err(SyncError::remote(RemoteOperation::ReplacePageContent))?;
                record.structured_id.clone()
            }
            None => stores
                .structured
                .create_page(route.structured_parent(), &source.title, &blocks)
                .await
                .map_err(SyncError::remote(RemoteOperation::CreatePage))?,
        };

        self.enter(run, SyncStage::FetchCanonical)?;
        let canonical = stores
            .structured
            .fetch_blocks(&structured_id)
            .await
            .map_err(SyncError::remote(RemoteOperation::FetchBlocks))?;

        self.enter(run, SyncStage::UploadMediaStage2)?;
        let mut plan = HtmlPlan::new(existing.as_ref(), self.settings.html_update_strategy);
        let hosted_refs = media_references(&canonical, |reference| {
            hosted_files.contains_key(reference)
        });

        if !hosted_refs.is_empty() && plan.current.is_none() {
            // Blobs attach to an existing document, so create it empty first.
            let doc_id = stores
                .html
                .create_document(route.html_folder(), &source.title, "")
                .await
                .map_err(SyncError::remote(RemoteOperation::CreateDocument))?;
            plan.current = Some(doc_id);
        }

        let mut stage2 = MediaMapping::new();
        let mut media_records = BTreeMap::new();
        if let Some(doc_id) = plan.current.as_deref() {
            for (hosted, _) in &hosted_refs {
                let Some(media) = hosted_files.get(hosted) else {
                    continue;
                };
                let bytes = tokio::fs::read(&media.location).await?;
                let file_hash = hash_bytes(&bytes);

                let cached = existing
                    .as_ref()
                    .and_then(|record| record.cached_blob(&media.key, doc_id, &file_hash))
                    .map(str::to_string);
                let blob_id = match cached {
                    Some(blob_id) => {
                        reused += 1;
                        debug!(media = %media.key, blob_id = %blob_id, "Reusing uploaded blob");
                        blob_id
                    }
                    None => {
                        let blob_id = stores
                            .html
                            .upload_blob(doc_id, &media.location)
                            .await
                            .map_err(SyncError::remote(RemoteOperation::UploadBlob))?;
                        uploaded += 1;
                        blob_id
                    }
                };

                stage2.insert(hosted.clone(), blob_id.clone());
                media_records.insert(
                    media.key.clone(),
                    MediaRecord {
                        content_hash: file_hash,
                        size: bytes.len() as u64,
                        html_doc_id: doc_id.to_string(),
                        blob_id,
                    },
                );
            }
        }

        self.enter(run, SyncStage::ConvertStage2)?;
        let page = html::serialize(&rewrite(&canonical, &stage2), HtmlTarget::Quip);

        self.enter(run, SyncStage::PublishFinal)?;
        let html_id = match plan.current {
            Some(doc_id) => {
                stores
                    .html
                    .replace_document(&doc_id, &page)
                    .await
                    .map_err(SyncError::remote(RemoteOperation::ReplaceDocument))?;
                doc_id
            }
            None => stores
                .html
                .create_document(route.html_folder(), &source.title, &page)
                .await
                .map_err(SyncError::remote(RemoteOperation::CreateDocument))?,
        };

        let mut record = SyncRecord {
            route: run.route.clone(),
            relative_path: run.relative_path.clone(),
            source_path: document.to_path_buf(),
            structured_id: structured_id.clone(),
            html_id: html_id.clone(),
            content_hash: source_hash.clone(),
            last_direction: Direction::Forward,
            media: media_records,
            pending_recreations: pending.clone(),
            last_synced_at: self.clock.now(),
        };

        if let Some(previous_id) = plan.previous {
            let marker = PendingRecreation {
                previous_id: previous_id.clone(),
                replacement_id: html_id.clone(),
                started_at: self.clock.now(),
            };

            // Checkpoint: the record must name the replacement before the
            // old document can disappear.
            record.pending_recreations.push(marker.clone());
            self.repository.upsert(&record).await?;
            self.emit(SyncEvent::RecreationPending {
                route: run.route.clone(),
                relative_path: run.relative_path.clone(),
                previous_id: previous_id.clone(),
                replacement_id: html_id.clone(),
            });

            self.retire_document(stores.html.as_ref(), &previous_id, &html_id)
                .await
                .map_err(|(operation, source)| SyncError::RecreationInterrupted {
                    previous_id: previous_id.clone(),
                    replacement_id: html_id.clone(),
                    operation,
                    source,
                })?;

            record.pending_recreations.retain(|p| p != &marker);
            pending = record.pending_recreations.clone();
        }

        self.enter(run, SyncStage::PersistState)?;
        record.pending_recreations = pending;
        self.repository.upsert(&record).await?;

        self.enter(run, SyncStage::Done)?;
        Ok(SyncOutcome {
            run_id: run.id,
            route: run.route.clone(),
            relative_path: run.relative_path.clone(),
            direction: Direction::Forward,
            created: existing.is_none(),
            structured_id,
            html_id,
            content_hash: source_hash,
            media_uploaded: uploaded,
            media_reused: reused,
            warnings,
        })
    }

    /// Moves backlinks from `previous_id` to `replacement_id`, then deletes
    /// the previous document.
    async fn retire_document(
        &self,
        html: &dyn HtmlStore,
        previous_id: &str,
        replacement_id: &str,
    ) -> std::result::Result<(), (RemoteOperation, BridgeError)> {
        let backlinks = html
            .find_backlinks(previous_id)
            .await
            .map_err(|e| (RemoteOperation::FindBacklinks, e))?;
        for linking_doc in &backlinks {
            html.rewrite_backlinks(linking_doc, previous_id, replacement_id)
                .await
                .map_err(|e| (RemoteOperation::RewriteBacklinks, e))?;
        }
        html.delete_document(previous_id)
            .await
            .map_err(|e| (RemoteOperation::DeleteDocument, e))?;
        info!(
            previous_id = %previous_id,
            replacement_id = %replacement_id,
            backlinks = backlinks.len(),
            "Recreated HTML document"
        );
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reverse
    // ------------------------------------------------------------------------

    async fn sync_reverse(
        &self,
        route: &RegisteredRoute,
        document: &Path,
        run: &mut SyncRun,
    ) -> Result<SyncOutcome> {
        let record = self
            .repository
            .find(&run.route, &run.relative_path)
            .await?
            .ok_or_else(|| SyncError::DocumentNotYetSynced {
                route: run.route.clone(),
                relative_path: run.relative_path.clone(),
            })?;

        let staging = self
            .settings
            .staging_dir_or_default()
            .join(run.id.to_string());
        let result = self
            .reverse_pipeline(route, document, run, record, &staging)
            .await;

        if staging.exists() {
            if let Err(err) = tokio::fs::remove_dir_all(&staging).await {
                warn!(
                    staging = %staging.display(),
                    error = %err,
                    "Failed to clean staging directory"
                );
            }
        }
        result
    }

    async fn reverse_pipeline(
        &self,
        route: &RegisteredRoute,
        document: &Path,
        run: &mut SyncRun,
        record: SyncRecord,
        staging: &Path,
    ) -> Result<SyncOutcome> {
        let stores = &route.stores;
        let mut warnings = pending_warnings(&record.pending_recreations);
        let mut uploaded = 0;

        let page = stores
            .html
            .fetch_document(&record.html_id)
            .await
            .map_err(SyncError::remote(RemoteOperation::FetchDocument))?;

        self.enter(run, SyncStage::ExtractMedia)?;
        let blocks = html::parse(&page);
        let blob_refs = media_references(&blocks, |reference| !is_url(reference));

        self.enter(run, SyncStage::UploadMediaStage1)?;
        let mut stage1 = MediaMapping::new();
        let mut staged: HashMap<String, StagedBlob> = HashMap::new();
        for (blob_id, kind) in blob_refs {
            let bytes = match stores.html.download_blob(&record.html_id, &blob_id).await {
                Ok(bytes) => bytes,
                Err(BridgeError::NotFound(_)) => {
                    warn!(blob_id = %blob_id, "Blob missing from HTML store");
                    warnings.push(SyncWarning::MissingBlob { reference: blob_id });
                    continue;
                }
                Err(err) => return Err(SyncError::remote(RemoteOperation::DownloadBlob)(err)),
            };

            let file_name = media_file_name(kind, &blob_id);
            tokio::fs::create_dir_all(staging).await?;
            let staged_path = staging.join(&file_name);
            tokio::fs::write(&staged_path, &bytes).await?;

            let hosted = stores
                .structured
                .upload_media(&staged_path)
                .await
                .map_err(SyncError::remote(RemoteOperation::UploadMedia))?;
            uploaded += 1;
            debug!(
                blob_id = %blob_id,
                hosted = %redact_url(&hosted),
                "Moved blob to structured store"
            );

            stage1.insert(blob_id.clone(), hosted.clone());
            staged.insert(
                hosted,
                StagedBlob {
                    blob_id,
                    file_name,
                    bytes,
                },
            );
        }

        self.enter(run, SyncStage::ConvertStage1)?;
        let blocks = rewrite(&blocks, &stage1);

        self.enter(run, SyncStage::PublishIntermediate)?;
        stores
            .structured
            .replace_page_content(&record.structured_id, &blocks)
            .await
            .map_err(SyncError::remote(RemoteOperation::ReplacePageContent))?;

        self.enter(run, SyncStage::FetchCanonical)?;
        let canonical = stores
            .structured
            .fetch_blocks(&record.structured_id)
            .await
            .map_err(SyncError::remote(RemoteOperation::FetchBlocks))?;

        self.enter(run, SyncStage::UploadMediaStage2)?;
        let mut stage2 = MediaMapping::new();
        let mut media_files = Vec::new();
        let mut media_records = BTreeMap::new();
        let note_dir = run
            .relative_path
            .rsplit_once('/')
            .map(|(dir, _)| format!("{}/", dir))
            .unwrap_or_default();
        let written = media_references(&canonical, |reference| staged.contains_key(reference));
        for (hosted, _) in written {
            let Some(blob) = staged.get(&hosted) else {
                continue;
            };
            let relative = format!("{}/{}", self.settings.media_output_folder, blob.file_name);
            stage2.insert(hosted.clone(), relative.clone());
            media_files.push(MediaFile {
                relative_path: PathBuf::from(&relative),
                bytes: blob.bytes.clone(),
            });
            media_records.insert(
                format!("{}{}", note_dir, relative),
                MediaRecord {
                    content_hash: hash_bytes(&blob.bytes),
                    size: blob.bytes.len() as u64,
                    html_doc_id: record.html_id.clone(),
                    blob_id: blob.blob_id.clone(),
                },
            );
        }

        self.enter(run, SyncStage::ConvertStage2)?;
        let canonical = rewrite(&canonical, &stage2);
        let content = markdown::serialize(&canonical);
        let title = title_from_blocks(&canonical).unwrap_or_else(|| file_stem(document));

        self.enter(run, SyncStage::PublishFinal)?;
        stores
            .source
            .write_document(document, &title, &content, media_files)
            .await
            .map_err(SyncError::remote(RemoteOperation::WriteSource))?;

        self.enter(run, SyncStage::PersistState)?;
        let written_hash = content_hash(&content);
        let updated = SyncRecord {
            source_path: document.to_path_buf(),
            content_hash: written_hash.clone(),
            last_direction: Direction::Reverse,
            media: media_records,
            last_synced_at: self.clock.now(),
            ..record
        };
        self.repository.upsert(&updated).await?;

        self.enter(run, SyncStage::Done)?;
        Ok(SyncOutcome {
            run_id: run.id,
            route: run.route.clone(),
            relative_path: run.relative_path.clone(),
            direction: Direction::Reverse,
            created: false,
            structured_id: updated.structured_id,
            html_id: updated.html_id,
            content_hash: written_hash,
            media_uploaded: uploaded,
            media_reused: 0,
            warnings,
        })
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn registered_route(&self, name: &str) -> Result<Arc<RegisteredRoute>> {
        let registered = self
            .routes
            .get(name)
            .cloned()
            .ok_or_else(|| SyncError::RouteNotFound {
                route: name.to_string(),
            })?;
        if !registered.config.enabled {
            return Err(SyncError::RouteDisabled {
                route: name.to_string(),
            });
        }
        Ok(registered)
    }

    async fn document_lock(&self, route: &str, relative_path: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry((route.to_string(), relative_path.to_string()))
                .or_default(),
        )
    }

    /// Drops the lock entry of a document once no other call holds or
    /// awaits it. The caller's guard must already be released.
    async fn release_lock(&self, route: &str, relative_path: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        // Owners left: the map entry and `lock`.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(&(route.to_string(), relative_path.to_string()));
        }
    }

    fn enter(&self, run: &mut SyncRun, stage: SyncStage) -> Result<()> {
        run.advance(stage)?;
        debug!(run_id = %run.id, stage = %stage, "Entered stage");
        self.emit_stage(run);
        Ok(())
    }

    fn emit_stage(&self, run: &SyncRun) {
        self.emit(SyncEvent::StageEntered {
            run_id: run.id.to_string(),
            route: run.route.clone(),
            relative_path: run.relative_path.clone(),
            stage: run.stage().to_string(),
        });
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            // No subscribers is not an error for the pipeline.
            bus.emit(CoreEvent::Sync(event)).ok();
        }
    }
}

/// Distinct media references of `blocks` accepted by `filter`, in document order.
fn media_references<F>(blocks: &[Block], filter: F) -> Vec<(String, MediaKind)>
where
    F: Fn(&str) -> bool,
{
    let mut seen = HashSet::new();
    blocks
        .iter()
        .filter_map(Block::as_media)
        .filter(|media| filter(media.reference()))
        .filter(|media| seen.insert(media.reference().to_string()))
        .map(|media| (media.reference().to_string(), media.kind()))
        .collect()
}

fn carried_recreations(existing: Option<&SyncRecord>) -> Vec<PendingRecreation> {
    existing
        .map(|record| record.pending_recreations.clone())
        .unwrap_or_default()
}

fn pending_warnings(pending: &[PendingRecreation]) -> Vec<SyncWarning> {
    pending
        .iter()
        .map(|p| SyncWarning::RecreationPending {
            previous_id: p.previous_id.clone(),
            replacement_id: p.replacement_id.clone(),
        })
        .collect()
}

/// File name for a downloaded blob: `image_<id>.png`, `video_<id>.mp4` or `file_<id>`.
fn media_file_name(kind: MediaKind, blob_id: &str) -> String {
    let id: String = blob_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    match kind {
        MediaKind::Image => format!("image_{}.png", id),
        MediaKind::Video => format!("video_{}.mp4", id),
        MediaKind::Document => format!("file_{}", id),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string())
}
