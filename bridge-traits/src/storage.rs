//! Document Store Abstractions
//!
//! The three stores a sync moves content between. Every write is a full
//! overwrite; none of the traits expose merge or partial update.

use async_trait::async_trait;
use bytes::Bytes;
use core_document::Block;
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, Result};

/// Block-tree page store.
///
/// Pages accept and return [`Block`] sequences directly. The store may
/// normalize content on write; [`fetch_blocks`](Self::fetch_blocks) returns the
/// normalized form.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::StructuredStore;
///
/// async fn publish(store: &dyn StructuredStore, blocks: &[Block]) -> Result<Vec<Block>> {
///     let page_id = store.create_page(None, "Release notes", blocks).await?;
///     store.fetch_blocks(&page_id).await
/// }
/// ```
#[async_trait]
pub trait StructuredStore: Send + Sync {
    /// Create a page and return its identifier
    ///
    /// The page is placed under `parent` when given, else at the store's
    /// default location.
    async fn create_page(
        &self,
        parent: Option<&str>,
        title: &str,
        blocks: &[Block],
    ) -> Result<String>;

    /// Replace all content of an existing page
    async fn replace_page_content(&self, page_id: &str, blocks: &[Block]) -> Result<()>;

    /// Fetch the canonical content of a page
    async fn fetch_blocks(&self, page_id: &str) -> Result<Vec<Block>>;

    /// Upload a local file and return its hosted address
    ///
    /// The address is only valid for a bounded time and must be used in a
    /// page write promptly. Media blocks fetched afterwards refer to the
    /// file by this same address.
    async fn upload_media(&self, file: &Path) -> Result<String>;
}

/// HTML document store with per-document binary blobs.
#[async_trait]
pub trait HtmlStore: Send + Sync {
    /// Create a document from HTML in `folder` (or the store's default
    /// folder) and return its identifier
    async fn create_document(
        &self,
        folder: Option<&str>,
        title: &str,
        html: &str,
    ) -> Result<String>;

    /// Replace all content of an existing document
    async fn replace_document(&self, doc_id: &str, html: &str) -> Result<()>;

    /// Fetch the HTML of a document
    async fn fetch_document(&self, doc_id: &str) -> Result<String>;

    /// Upload a local file as a blob of the given document
    async fn upload_blob(&self, doc_id: &str, file: &Path) -> Result<String>;

    /// Download a blob of the given document
    async fn download_blob(&self, doc_id: &str, blob: &str) -> Result<Bytes>;

    /// Delete a document
    async fn delete_document(&self, doc_id: &str) -> Result<()>;

    /// Identifiers of documents that link to `doc_id`
    ///
    /// Stores that cannot enumerate links report none.
    async fn find_backlinks(&self, _doc_id: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Rewrite links to `old_id` inside `linking_doc` so they point at `new_id`
    async fn rewrite_backlinks(&self, linking_doc: &str, old_id: &str, new_id: &str) -> Result<()> {
        let _ = (old_id, new_id);
        Err(BridgeError::NotAvailable(format!(
            "backlink rewriting for document {}",
            linking_doc
        )))
    }
}

/// A Markdown document read from the source store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub title: String,
    pub content: String,
}

/// A media file written alongside a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Path relative to the document's directory, e.g. `_media/image_ab12.png`
    pub relative_path: PathBuf,
    pub bytes: Bytes,
}

/// Local Markdown document store.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Read a document; the title is the first level-1 heading or the file stem
    async fn read_document(&self, path: &Path) -> Result<SourceDocument>;

    /// Write a document and its media files
    ///
    /// Media files that already exist are left untouched.
    async fn write_document(
        &self,
        path: &Path,
        title: &str,
        content: &str,
        media: Vec<MediaFile>,
    ) -> Result<()>;
}
