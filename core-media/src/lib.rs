//! # Media Reference Module
//!
//! Locates the binary files that media references in Markdown documents
//! point to.
//!
//! ## Overview
//!
//! Two notations are recognised:
//! - **Embed** `![[name]]` (optionally `![[name|alias]]`), resolved against the
//!   referencing document, the document-tree root, and a list of conventional
//!   media folders
//! - **Standard** `![alt](path)` or `![alt](<path>)`, resolved against the root
//!   for leading-separator paths and against the document directory otherwise
//!
//! `http://` and `https://` targets are never treated as local media.
//!
//! ## Usage
//!
//! ```no_run
//! use core_media::{MediaResolver, ResolverConfig};
//! use std::path::Path;
//!
//! let resolver = MediaResolver::new(ResolverConfig::default());
//! let found = resolver.resolve(
//!     "![[diagram.png]]",
//!     Path::new("/vault/notes/design.md"),
//!     Path::new("/vault"),
//! );
//! ```

pub mod kind;
pub mod reference;
pub mod resolver;

pub use kind::{FileKind, MediaKind};
pub use reference::{code_span_ranges, find_references, is_url, MediaSyntax, Notation};
pub use resolver::{MediaReference, MediaResolver, ResolverConfig};
