//! Persisted per-document sync state.

use crate::stage::Direction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Lower-hex SHA-256 of a document's text.
pub fn content_hash(text: &str) -> String {
    hash_bytes(text.as_bytes())
}

/// Lower-hex SHA-256 of raw bytes.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Upload bookkeeping for one media target of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// SHA-256 of the file contents when it was uploaded.
    pub content_hash: String,
    pub size: u64,
    /// HTML-store document the blob is attached to.
    pub html_doc_id: String,
    pub blob_id: String,
}

impl MediaRecord {
    /// A blob can be reused only by the document it is attached to, and only
    /// while the file is unchanged.
    pub fn reusable_for(&self, html_doc_id: &str, content_hash: &str) -> bool {
        self.html_doc_id == html_doc_id && self.content_hash == content_hash
    }
}

/// A recreation that replaced `previous_id` with `replacement_id` but has not
/// been confirmed complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRecreation {
    pub previous_id: String,
    pub replacement_id: String,
    pub started_at: DateTime<Utc>,
}

/// Sync state of one document on one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    pub route: String,
    pub relative_path: String,
    pub source_path: PathBuf,
    pub structured_id: String,
    pub html_id: String,
    /// Hash of the Markdown text at the last successful sync.
    pub content_hash: String,
    pub last_direction: Direction,
    /// Keyed by media target as written in the Markdown document.
    pub media: BTreeMap<String, MediaRecord>,
    pub pending_recreations: Vec<PendingRecreation>,
    pub last_synced_at: DateTime<Utc>,
}

impl SyncRecord {
    pub fn has_pending_recreation(&self) -> bool {
        !self.pending_recreations.is_empty()
    }

    /// Blob previously uploaded for `target`, if still valid for this document
    /// and file contents.
    pub fn cached_blob(&self, target: &str, html_doc_id: &str, file_hash: &str) -> Option<&str> {
        self.media
            .get(target)
            .filter(|media| media.reusable_for(html_doc_id, file_hash))
            .map(|media| media.blob_id.as_str())
    }
}
