//! # Document Sync Module
//!
//! Moves documents between a Markdown vault, a structured block store and an
//! HTML document store.
//!
//! ## Overview
//!
//! This module owns everything a sync decides rather than converts:
//! - Whether a destination is created or updated, from persisted sync records
//! - Media upload and reference rewriting in both directions
//! - Recreation of HTML documents, with crash-safe bookkeeping
//! - Per-document mutual exclusion and bounded batch concurrency
//!
//! ## Components
//!
//! - **Sync Run State Machine** (`stage`): Validated pipeline stage transitions
//! - **Sync Records** (`record`): Per-document state, content and media hashes
//! - **Database** (`db`): SQLite pool with embedded migrations
//! - **Repository** (`repository`): Persistence for sync records
//! - **Sync Orchestrator** (`orchestrator`): Runs forward and reverse syncs

pub mod db;
pub mod error;
pub mod orchestrator;
pub mod record;
pub mod repository;
pub mod stage;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{RemoteOperation, Result, SyncError};
pub use orchestrator::{
    DocumentStatus, RouteStores, SyncOrchestrator, SyncOutcome, SyncRequest, SyncWarning,
};
pub use record::{content_hash, hash_bytes, MediaRecord, PendingRecreation, SyncRecord};
pub use repository::{SqliteSyncRecordRepository, SyncRecordRepository};
pub use stage::{Direction, SyncRun, SyncRunId, SyncStage};
