use bridge_traits::BridgeError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The external capability a failed call belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperation {
    ReadSource,
    WriteSource,
    CreatePage,
    ReplacePageContent,
    FetchBlocks,
    UploadMedia,
    CreateDocument,
    ReplaceDocument,
    FetchDocument,
    UploadBlob,
    DownloadBlob,
    DeleteDocument,
    FindBacklinks,
    RewriteBacklinks,
}

impl RemoteOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteOperation::ReadSource => "read_source",
            RemoteOperation::WriteSource => "write_source",
            RemoteOperation::CreatePage => "create_page",
            RemoteOperation::ReplacePageContent => "replace_page_content",
            RemoteOperation::FetchBlocks => "fetch_blocks",
            RemoteOperation::UploadMedia => "upload_media",
            RemoteOperation::CreateDocument => "create_document",
            RemoteOperation::ReplaceDocument => "replace_document",
            RemoteOperation::FetchDocument => "fetch_document",
            RemoteOperation::UploadBlob => "upload_blob",
            RemoteOperation::DownloadBlob => "download_blob",
            RemoteOperation::DeleteDocument => "delete_document",
            RemoteOperation::FindBacklinks => "find_backlinks",
            RemoteOperation::RewriteBacklinks => "rewrite_backlinks",
        }
    }
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Route not registered: {route}")]
    RouteNotFound { route: String },

    #[error("Route {route} is disabled")]
    RouteDisabled { route: String },

    #[error("Document {relative_path} has not been synced forward on route {route}")]
    DocumentNotYetSynced { route: String, relative_path: String },

    #[error("Document {path} is outside route root {root}")]
    DocumentOutsideRoute { path: PathBuf, root: PathBuf },

    #[error("{operation} failed: {source}")]
    Remote {
        operation: RemoteOperation,
        #[source]
        source: BridgeError,
    },

    #[error(
        "Recreation of document {previous_id} as {replacement_id} was interrupted at \
         {operation}; both may exist and backlinks need manual reconciliation: {source}"
    )]
    RecreationInterrupted {
        previous_id: String,
        replacement_id: String,
        operation: RemoteOperation,
        #[source]
        source: BridgeError,
    },

    #[error("Invalid stage transition from {from} to {to}")]
    InvalidStageTransition { from: String, to: String },

    #[error("Invalid sync direction: {0}")]
    InvalidDirection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Wraps a bridge failure with the capability that produced it.
    pub fn remote(operation: RemoteOperation) -> impl FnOnce(BridgeError) -> SyncError {
        move |source| SyncError::Remote { operation, source }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
