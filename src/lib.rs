//! Workspace placeholder crate.
//!
//! This crate exposes feature flags that map to the individual workspace
//! crates (e.g., `core-sync`, `core-document`, `bridge-desktop`). Host
//! applications can depend on `docsync-workspace` and enable the documented
//! features without wiring each crate individually.

#[cfg(any(feature = "desktop-shims", feature = "convert-only"))]
pub use core_document as document;

#[cfg(feature = "desktop-shims")]
pub use core_runtime as runtime;

#[cfg(feature = "desktop-shims")]
pub use core_sync as sync;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop as desktop;
