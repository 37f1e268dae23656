//! # Document Conversion Module
//!
//! Block model and the converters that target it.
//!
//! ## Overview
//!
//! - **Block Model** (`block`): immutable, structurally comparable content blocks
//! - **Markdown** (`markdown`): Markdown ⇄ blocks
//! - **HTML** (`html`): platform HTML ⇄ blocks, target-aware rendering
//! - **Rewriter** (`rewrite`): swaps media references using a [`MediaMapping`]
//!
//! ## Usage
//!
//! ```
//! use core_document::{html, markdown, HtmlTarget};
//!
//! let blocks = markdown::parse("# Notes\n\nHello **world**.\n");
//! let page = html::serialize(&blocks, HtmlTarget::Quip);
//! assert_eq!(html::parse(&page), blocks);
//! ```

pub mod block;
pub mod html;
mod inline;
pub mod markdown;
pub mod rewrite;

pub use block::{
    normalize_spans, Block, Cell, CodeBlock, Heading, ListItem, Media, MediaKind, Notation,
    Paragraph, Span, SpanStyle, Table,
};
pub use html::HtmlTarget;
pub use rewrite::{rewrite, MediaMapping};

/// Title of a Markdown document: the first level-1 heading, if any.
pub fn title_from_blocks(blocks: &[Block]) -> Option<String> {
    blocks.iter().find_map(|block| match block {
        Block::Heading(h) if h.level() == 1 => {
            let title = block.plain_text();
            (!title.trim().is_empty()).then(|| title.trim().to_string())
        }
        _ => None,
    })
}
