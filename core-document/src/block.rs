//! # Block Model
//!
//! The intermediate representation shared by every converter: an ordered
//! sequence of typed, immutable content blocks.
//!
//! Blocks are only ever built through their constructors. Rewriting a block
//! produces a new value; nothing exposes mutable access to block contents.

pub use core_media::{MediaKind, Notation};

/// Inline style flags. All flags unset is plain text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SpanStyle {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
}

impl SpanStyle {
    pub const PLAIN: SpanStyle = SpanStyle {
        bold: false,
        italic: false,
        code: false,
    };

    pub fn bold() -> Self {
        Self { bold: true, ..Self::PLAIN }
    }

    pub fn italic() -> Self {
        Self { italic: true, ..Self::PLAIN }
    }

    pub fn code() -> Self {
        Self { code: true, ..Self::PLAIN }
    }

    pub fn is_plain(&self) -> bool {
        *self == Self::PLAIN
    }
}

/// An inline run of text with a style and an optional link target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    text: String,
    style: SpanStyle,
    link: Option<String>,
}

impl Span {
    pub fn new(text: impl Into<String>, style: SpanStyle) -> Self {
        Self {
            text: text.into(),
            style,
            link: None,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, SpanStyle::PLAIN)
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn style(&self) -> SpanStyle {
        self.style
    }

    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }

    /// Same style and link, different text.
    pub fn with_text(&self, text: impl Into<String>) -> Span {
        Span {
            text: text.into(),
            style: self.style,
            link: self.link.clone(),
        }
    }
}

/// Merge adjacent spans with identical style and link; drop empty spans.
///
/// Concatenated text is unchanged, so two inline sequences with the same
/// visible text and styling compare equal regardless of how they were split.
pub fn normalize_spans(spans: Vec<Span>) -> Vec<Span> {
    let mut out: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans.into_iter().filter(|s| !s.text.is_empty()) {
        match out.last_mut() {
            Some(last) if last.style == span.style && last.link == span.link => {
                last.text.push_str(&span.text);
            }
            _ => out.push(span),
        }
    }
    out
}

/// Normalize spans, then strip whitespace from the outer edges of the
/// sequence. Code spans are never trimmed.
pub(crate) fn trim_edges(spans: Vec<Span>) -> Vec<Span> {
    let mut spans = normalize_spans(spans);
    while let Some(first) = spans.first() {
        if first.style.code {
            break;
        }
        let trimmed = first.text.trim_start().to_string();
        if trimmed.is_empty() {
            spans.remove(0);
            continue;
        }
        spans[0].text = trimmed;
        break;
    }
    while let Some(last) = spans.last_mut() {
        if last.style.code {
            break;
        }
        let trimmed = last.text.trim_end().len();
        if trimmed == 0 {
            spans.pop();
            continue;
        }
        last.text.truncate(trimmed);
        break;
    }
    spans
}

/// Concatenated text of a span sequence.
pub fn plain_text(spans: &[Span]) -> String {
    spans.iter().map(Span::text).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    level: u8,
    spans: Vec<Span>,
}

impl Heading {
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    spans: Vec<Span>,
}

impl Paragraph {
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    ordered: bool,
    depth: usize,
    spans: Vec<Span>,
}

impl ListItem {
    pub fn ordered(&self) -> bool {
        self.ordered
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }
}

/// A table cell: a sequence of spans.
pub type Cell = Vec<Span>;

/// A table. Every row has the same number of cells; short rows are padded
/// with empty cells on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    language: Option<String>,
    text: String,
}

impl CodeBlock {
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A media block.
///
/// `notation` records how a Markdown source wrote the reference; blocks from
/// HTML or the structured store carry `None` and are written back in
/// whichever notation fits the reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    kind: MediaKind,
    reference: String,
    caption: Option<String>,
    notation: Option<Notation>,
}

impl Media {
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn notation(&self) -> Option<Notation> {
        self.notation
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    /// A copy of this media block pointing at a different reference.
    pub fn with_reference(&self, reference: impl Into<String>) -> Media {
        Media {
            kind: self.kind,
            reference: reference.into(),
            caption: self.caption.clone(),
            notation: self.notation,
        }
    }
}

/// A content block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading(Heading),
    Paragraph(Paragraph),
    ListItem(ListItem),
    Table(Table),
    CodeBlock(CodeBlock),
    Media(Media),
}

impl Block {
    /// Heading block; the level is clamped to `1..=6`.
    pub fn heading(level: u8, spans: Vec<Span>) -> Self {
        Block::Heading(Heading {
            level: level.clamp(1, 6),
            spans: normalize_spans(spans),
        })
    }

    pub fn paragraph(spans: Vec<Span>) -> Self {
        Block::Paragraph(Paragraph {
            spans: normalize_spans(spans),
        })
    }

    pub fn list_item(ordered: bool, depth: usize, spans: Vec<Span>) -> Self {
        Block::ListItem(ListItem {
            ordered,
            depth,
            spans: normalize_spans(spans),
        })
    }

    /// Table block; ragged rows are padded to the widest row.
    pub fn table(rows: Vec<Vec<Cell>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|row| {
                let mut row: Vec<Cell> = row.into_iter().map(normalize_spans).collect();
                row.resize_with(width, Vec::new);
                row
            })
            .collect();
        Block::Table(Table { rows })
    }

    pub fn code(language: Option<String>, text: impl Into<String>) -> Self {
        Block::CodeBlock(CodeBlock {
            language: language.filter(|l| !l.is_empty()),
            text: text.into(),
        })
    }

    pub fn media(kind: MediaKind, reference: impl Into<String>, caption: Option<String>) -> Self {
        Block::Media(Media {
            kind,
            reference: reference.into(),
            caption: caption.filter(|c| !c.is_empty()),
            notation: None,
        })
    }

    /// Media block remembering the Markdown notation it was written in.
    pub fn media_written(
        notation: Notation,
        kind: MediaKind,
        reference: impl Into<String>,
        caption: Option<String>,
    ) -> Self {
        Block::Media(Media {
            kind,
            reference: reference.into(),
            caption: caption.filter(|c| !c.is_empty()),
            notation: Some(notation),
        })
    }

    /// The block without source-notation details, for comparing documents
    /// that went through formats which cannot record them.
    pub fn to_portable(&self) -> Block {
        match self {
            Block::Media(m) if m.notation.is_some() => Block::Media(Media {
                notation: None,
                ..m.clone()
            }),
            other => other.clone(),
        }
    }

    /// Name of the block kind, for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Block::Heading(_) => "heading",
            Block::Paragraph(_) => "paragraph",
            Block::ListItem(_) => "list_item",
            Block::Table(_) => "table",
            Block::CodeBlock(_) => "code_block",
            Block::Media(_) => "media",
        }
    }

    /// Inline spans of text-bearing blocks.
    pub fn spans(&self) -> Option<&[Span]> {
        match self {
            Block::Heading(h) => Some(h.spans()),
            Block::Paragraph(p) => Some(p.spans()),
            Block::ListItem(l) => Some(l.spans()),
            Block::Table(_) | Block::CodeBlock(_) | Block::Media(_) => None,
        }
    }

    /// Plain-text rendering of the block.
    pub fn plain_text(&self) -> String {
        match self {
            Block::Heading(h) => plain_text(h.spans()),
            Block::Paragraph(p) => plain_text(p.spans()),
            Block::ListItem(l) => plain_text(l.spans()),
            Block::Table(t) => t
                .rows()
                .iter()
                .map(|row| row.iter().map(|c| plain_text(c)).collect::<Vec<_>>().join("\t"))
                .collect::<Vec<_>>()
                .join("\n"),
            Block::CodeBlock(c) => c.text().to_string(),
            Block::Media(m) => m.caption().unwrap_or(m.reference()).to_string(),
        }
    }

    pub fn as_media(&self) -> Option<&Media> {
        match self {
            Block::Media(m) => Some(m),
            _ => None,
        }
    }
}
