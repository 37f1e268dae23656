//! # Host Bridge Traits
//!
//! Capability interfaces the sync core drives but never implements itself.
//!
//! ## Overview
//!
//! This crate defines the contract between the core and the collaborators that
//! talk to the outside world. Each trait is one capability; transport,
//! authentication, pagination and retry all live behind it.
//!
//! ## Traits
//!
//! ### Document stores
//! - [`StructuredStore`](storage::StructuredStore) - Block-tree pages (Notion-like)
//! - [`HtmlStore`](storage::HtmlStore) - HTML documents with binary blobs (Quip-like)
//! - [`SourceStore`](storage::SourceStore) - Markdown documents on disk (Obsidian vault)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert transport errors into `BridgeError::OperationFailed` with an
//! actionable message, and report missing remote documents as
//! `BridgeError::NotFound`.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so independent documents can be
//! synced from concurrent tasks.

pub mod error;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use storage::{HtmlStore, MediaFile, SourceDocument, SourceStore, StructuredStore};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
