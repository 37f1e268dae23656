//! Markdown vault access using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{MediaFile, SourceDocument, SourceStore},
};
use core_document::{markdown, title_from_blocks};
use std::path::{Component, Path};
use tokio::fs;
use tracing::debug;

/// Tokio-based [`SourceStore`] over Markdown files on the local disk.
///
/// Paths handed to the store are used as given; route roots and relative
/// paths are the orchestrator's concern.
#[derive(Debug, Clone, Default)]
pub struct LocalSourceStore;

impl LocalSourceStore {
    pub fn new() -> Self {
        Self
    }

    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(Self::map_io_error)?;
        }
        Ok(())
    }
}

/// Media files must stay under the document's directory.
fn is_contained(relative: &Path) -> bool {
    relative.components().next().is_some()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string())
}

#[async_trait]
impl SourceStore for LocalSourceStore {
    async fn read_document(&self, path: &Path) -> Result<SourceDocument> {
        let content = fs::read_to_string(path)
            .await
            .map_err(Self::map_io_error)?;
        let title =
            title_from_blocks(&markdown::parse(&content)).unwrap_or_else(|| file_stem(path));

        debug!(path = ?path, size = content.len(), title = %title, "Read document");
        Ok(SourceDocument { title, content })
    }

    async fn write_document(
        &self,
        path: &Path,
        title: &str,
        content: &str,
        media: Vec<MediaFile>,
    ) -> Result<()> {
        if let Some(file) = media.iter().find(|f| !is_contained(&f.relative_path)) {
            return Err(BridgeError::OperationFailed(format!(
                "media path {} escapes the document directory",
                file.relative_path.display()
            )));
        }

        Self::ensure_parent(path).await?;
        fs::write(path, content)
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, size = content.len(), title = %title, "Wrote document");

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        for file in media {
            let target = dir.join(&file.relative_path);
            if fs::try_exists(&target)
                .await
                .map_err(Self::map_io_error)?
            {
                debug!(path = ?target, "Media file exists, leaving it untouched");
                continue;
            }

            Self::ensure_parent(&target).await?;
            fs::write(&target, file.bytes.as_ref())
                .await
                .map_err(Self::map_io_error)?;
            debug!(path = ?target, size = file.bytes.len(), "Wrote media file");
        }

        Ok(())
    }
}
