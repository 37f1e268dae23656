//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `SourceStore` using `tokio::fs` over a local Markdown vault
//!
//! The structured and HTML stores are network services; their clients live
//! with the host application, behind the same traits.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::LocalSourceStore;
//! use bridge_traits::SourceStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let vault = LocalSourceStore::new();
//!     let doc = vault.read_document(Path::new("/vault/daily.md")).await?;
//!     println!("{}", doc.title);
//! }
//! ```

mod filesystem;

pub use filesystem::LocalSourceStore;
