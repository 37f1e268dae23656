//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the document sync core:
//! - Logging and tracing infrastructure
//! - Route and sync configuration
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the sync orchestrator and the
//! host shims depend on. Configuration is a TOML file listing named routes,
//! each binding a Markdown vault folder to a structured-store parent page and
//! an HTML-store folder. Sync progress is broadcast on the [`events::EventBus`].

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
