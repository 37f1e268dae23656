//! # HTML Converter
//!
//! Parses platform HTML into blocks and renders blocks as HTML for a given
//! target platform.
//!
//! ## Target differences
//!
//! - **Quip**: video renders as a `data-media="video"` container holding a
//!   thumbnail image (`<blob>-jpg`) and a link to the blob
//! - **Notion**: video renders as a `<video>` element
//!
//! Tables always render as plain row/cell markup. Whether the destination
//! displays them is up to the platform.

use crate::block::{trim_edges, Block, Cell, MediaKind, Span, SpanStyle};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Platform the rendered HTML is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HtmlTarget {
    Notion,
    Quip,
}

impl fmt::Display for HtmlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HtmlTarget::Notion => f.write_str("notion"),
            HtmlTarget::Quip => f.write_str("quip"),
        }
    }
}

static LAYOUT_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]*[\r\n][ \t\r\n]*").expect("layout break pattern is valid"));

const SKIPPED: &[&str] = &[
    "head", "script", "style", "title", "meta", "link", "template", "noscript",
];
const CONTAINERS: &[&str] = &[
    "html", "body", "div", "section", "article", "main", "header", "footer", "nav", "aside",
    "figure", "figcaption", "blockquote", "center", "form",
];

enum Inline {
    Span(Span),
    Media(Block),
}

/// Parse HTML into blocks.
///
/// Accepts whole documents and fragments alike. Text keeps its spaces and
/// tabs; only runs of whitespace that contain a line break collapse to one
/// space. Code keeps its text exactly.
pub fn parse(html: &str) -> Vec<Block> {
    let document = Html::parse_document(html);
    let mut walker = BlockWalker::default();
    walker.walk(document.root_element());
    walker.flush();
    walker.blocks
}

#[derive(Default)]
struct BlockWalker {
    blocks: Vec<Block>,
    pending: Vec<Inline>,
}

impl BlockWalker {
    fn walk(&mut self, parent: ElementRef<'_>) {
        for child in parent.children() {
            if let Some(e) = ElementRef::wrap(child) {
                self.element(e);
            } else if let Node::Text(text) = child.value() {
                self.pending.push(Inline::Span(Span::plain(layout_whitespace(text))));
            }
        }
    }

    fn element(&mut self, e: ElementRef<'_>) {
        let name = e.value().name();
        if let Some(level) = heading_level(name) {
            self.flush();
            let mut items = Vec::new();
            collect_children(e, SpanStyle::PLAIN, None, &mut items);
            let (spans, media) = split_media(items);
            self.blocks.push(Block::heading(level, trim_edges(spans)));
            self.blocks.extend(media);
            return;
        }
        if let Some(media) = media_element(e) {
            self.flush();
            self.blocks.extend(media);
            return;
        }
        match name {
            "p" => {
                self.flush();
                collect_children(e, SpanStyle::PLAIN, None, &mut self.pending);
                self.flush();
            }
            "ul" | "ol" => {
                self.flush();
                self.list(e, name == "ol", 0);
            }
            "li" => {
                self.flush();
                self.list_item(e, false, 0);
            }
            "table" => {
                self.flush();
                let mut rows = Vec::new();
                collect_rows(e, &mut rows);
                if !rows.is_empty() {
                    self.blocks.push(Block::table(rows));
                }
            }
            "pre" => {
                self.flush();
                let language = e
                    .value()
                    .attr("data-language")
                    .map(str::to_string)
                    .or_else(|| class_language(e))
                    .or_else(|| find(e, "code").and_then(class_language));
                let text: String = e.text().collect();
                let text = text.strip_prefix('\n').unwrap_or(&text);
                self.blocks.push(Block::code(language, text));
            }
            "br" | "hr" => self.flush(),
            _ if SKIPPED.contains(&name) => {}
            _ if CONTAINERS.contains(&name) => {
                self.flush();
                self.walk(e);
                self.flush();
            }
            _ => {
                debug!(tag = name, "Treating unknown element as inline text");
                collect_element(e, SpanStyle::PLAIN, None, &mut self.pending);
            }
        }
    }

    fn list(&mut self, e: ElementRef<'_>, ordered: bool, depth: usize) {
        for child in e.children() {
            if let Some(el) = ElementRef::wrap(child) {
                match el.value().name() {
                    "li" => self.list_item(el, ordered, depth),
                    nested @ ("ul" | "ol") => self.list(el, nested == "ol", depth + 1),
                    _ => {
                        let mut items = Vec::new();
                        collect_element(el, SpanStyle::PLAIN, None, &mut items);
                        self.push_item(ordered, depth, items);
                    }
                }
            } else if let Node::Text(text) = child.value() {
                if !text.trim().is_empty() {
                    let span = Span::plain(layout_whitespace(text));
                    self.push_item(ordered, depth, vec![Inline::Span(span)]);
                }
            }
        }
    }

    fn list_item(&mut self, li: ElementRef<'_>, ordered: bool, depth: usize) {
        let mut items = Vec::new();
        let mut nested = Vec::new();
        for child in li.children() {
            if let Some(el) = ElementRef::wrap(child) {
                if matches!(el.value().name(), "ul" | "ol") {
                    nested.push(el);
                } else {
                    collect_element(el, SpanStyle::PLAIN, None, &mut items);
                }
            } else if let Node::Text(text) = child.value() {
                items.push(Inline::Span(Span::plain(layout_whitespace(text))));
            }
        }
        self.push_item(ordered, depth, items);
        for list in nested {
            self.list(list, list.value().name() == "ol", depth + 1);
        }
    }

    fn push_item(&mut self, ordered: bool, depth: usize, items: Vec<Inline>) {
        let (spans, media) = split_media(items);
        self.blocks.push(Block::list_item(ordered, depth, trim_edges(spans)));
        self.blocks.extend(media);
    }

    /// Emit pending inline content as paragraphs, split around media.
    fn flush(&mut self) {
        let mut run = Vec::new();
        for item in std::mem::take(&mut self.pending) {
            match item {
                Inline::Span(span) => run.push(span),
                Inline::Media(block) => {
                    self.push_paragraph(std::mem::take(&mut run));
                    self.blocks.push(block);
                }
            }
        }
        self.push_paragraph(run);
    }

    fn push_paragraph(&mut self, spans: Vec<Span>) {
        let spans = trim_edges(spans);
        if !spans.is_empty() {
            self.blocks.push(Block::paragraph(spans));
        }
    }
}

fn heading_level(name: &str) -> Option<u8> {
    let digit = name.strip_prefix('h')?;
    match digit.parse::<u8>() {
        Ok(level @ 1..=6) if digit.len() == 1 => Some(level),
        _ => None,
    }
}

/// First descendant element named `name`.
fn find<'a>(e: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    e.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|d| d.value().name() == name)
}

fn class_language(e: ElementRef<'_>) -> Option<String> {
    e.value()
        .attr("class")?
        .split_whitespace()
        .find_map(|c| c.strip_prefix("language-"))
        .map(str::to_string)
}

fn collect_rows(e: ElementRef<'_>, rows: &mut Vec<Vec<Cell>>) {
    for child in e.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => {
                let row = child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                    .map(|cell| {
                        let mut items = Vec::new();
                        collect_children(cell, SpanStyle::PLAIN, None, &mut items);
                        trim_edges(split_media(items).0)
                    })
                    .collect();
                rows.push(row);
            }
            "thead" | "tbody" | "tfoot" => collect_rows(child, rows),
            _ => {}
        }
    }
}

/// Media blocks for an element that embeds media, if it does.
fn media_element(e: ElementRef<'_>) -> Option<Option<Block>> {
    let element = e.value();
    let block = match element.name() {
        "img" => {
            let src = element.attr("src").unwrap_or_default();
            (!src.is_empty()).then(|| {
                Block::media(MediaKind::Image, src, element.attr("alt").map(str::to_string))
            })
        }
        "video" => {
            let src = element
                .attr("src")
                .or_else(|| find(e, "source").and_then(|s| s.value().attr("src")))
                .unwrap_or_default();
            (!src.is_empty()).then(|| {
                Block::media(MediaKind::Video, src, element.attr("title").map(str::to_string))
            })
        }
        "div" | "span" => {
            let kind = MediaKind::parse(element.attr("data-media")?)?;
            let link = find(e, "a");
            let reference = link
                .and_then(|a| a.value().attr("href"))
                .map(str::to_string)
                .or_else(|| {
                    find(e, "img")
                        .and_then(|img| img.value().attr("src"))
                        .map(|src| src.trim_end_matches("-jpg").to_string())
                })
                .unwrap_or_default();
            let caption = link.and_then(|a| a.value().attr("title")).map(str::to_string);
            (!reference.is_empty()).then(|| Block::media(kind, reference, caption))
        }
        _ => return None,
    };
    Some(block)
}

fn collect_children(
    parent: ElementRef<'_>,
    style: SpanStyle,
    link: Option<&str>,
    out: &mut Vec<Inline>,
) {
    for child in parent.children() {
        if let Some(e) = ElementRef::wrap(child) {
            collect_element(e, style, link, out);
        } else if let Node::Text(text) = child.value() {
            let text = if style.code {
                text.to_string()
            } else {
                layout_whitespace(text)
            };
            let span = Span::new(text, style);
            out.push(Inline::Span(match link {
                Some(target) => span.with_link(target),
                None => span,
            }));
        }
    }
}

fn collect_element(e: ElementRef<'_>, style: SpanStyle, link: Option<&str>, out: &mut Vec<Inline>) {
    if let Some(media) = media_element(e) {
        out.extend(media.map(Inline::Media));
        return;
    }
    let element = e.value();
    let name = element.name();
    if SKIPPED.contains(&name) {
        return;
    }
    let mut inner = style;
    let mut inner_link = link;
    match name {
        "b" | "strong" => inner.bold = true,
        "i" | "em" | "cite" => inner.italic = true,
        "code" | "tt" | "kbd" | "samp" => inner.code = true,
        "a" => inner_link = element.attr("href").filter(|h| !h.is_empty()).or(link),
        "br" => {
            out.push(Inline::Span(Span::new(" ", style)));
            return;
        }
        _ => {}
    }
    collect_children(e, inner, inner_link, out);
}

fn split_media(items: Vec<Inline>) -> (Vec<Span>, Vec<Block>) {
    let mut spans = Vec::new();
    let mut media = Vec::new();
    for item in items {
        match item {
            Inline::Span(span) => spans.push(span),
            Inline::Media(block) => media.push(block),
        }
    }
    (spans, media)
}

/// Whitespace runs that contain a line break are source layout and become
/// one space. Other whitespace is content.
fn layout_whitespace(text: &str) -> String {
    LAYOUT_BREAK.replace_all(text, " ").into_owned()
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

/// Render blocks as HTML for the given target.
pub fn serialize(blocks: &[Block], target: HtmlTarget) -> String {
    let mut out = Vec::new();
    let mut i = 0;
    while i < blocks.len() {
        if let Block::ListItem(_) = &blocks[i] {
            let end = blocks[i..]
                .iter()
                .position(|b| !matches!(b, Block::ListItem(_)))
                .map(|p| i + p)
                .unwrap_or(blocks.len());
            out.push(render_list(&blocks[i..end]));
            i = end;
            continue;
        }
        out.push(render_block(&blocks[i], target));
        i += 1;
    }
    out.join("\n")
}

fn render_block(block: &Block, target: HtmlTarget) -> String {
    match block {
        Block::Heading(h) => format!("<h{0}>{1}</h{0}>", h.level(), render_spans(h.spans())),
        Block::Paragraph(p) => format!("<p>{}</p>", render_spans(p.spans())),
        Block::ListItem(_) => render_list(std::slice::from_ref(block)),
        Block::Table(table) => {
            let mut s = String::from("<table><tbody>");
            for (r, row) in table.rows().iter().enumerate() {
                let tag = if r == 0 { "th" } else { "td" };
                s.push_str("<tr>");
                for cell in row {
                    s.push_str(&format!("<{0}>{1}</{0}>", tag, render_spans(cell)));
                }
                s.push_str("</tr>");
            }
            s.push_str("</tbody></table>");
            s
        }
        Block::CodeBlock(code) => {
            let lead = if code.text().starts_with('\n') { "\n" } else { "" };
            let language = code
                .language()
                .map(|l| format!(" data-language=\"{}\"", escape_attr(l)))
                .unwrap_or_default();
            format!("<pre{}><code>{}{}</code></pre>", language, lead, escape_text(code.text()))
        }
        Block::Media(media) => {
            let reference = escape_attr(media.reference());
            let caption = media.caption().map(escape_attr);
            let title = caption
                .as_deref()
                .map(|c| format!(" title=\"{}\"", c))
                .unwrap_or_default();
            match (media.kind(), target) {
                (MediaKind::Image, _) => format!(
                    "<div data-section-style=\"11\"><img src=\"{}\" alt=\"{}\"></div>",
                    reference,
                    caption.as_deref().unwrap_or_default()
                ),
                (MediaKind::Video, HtmlTarget::Quip) => format!(
                    concat!(
                        "<div data-media=\"video\"><img src=\"{0}-jpg\" alt=\"\">",
                        "<span>Video: <a href=\"{0}\"{1}>{2}</a></span></div>"
                    ),
                    reference,
                    title,
                    caption.as_deref().unwrap_or("Play")
                ),
                (MediaKind::Video, HtmlTarget::Notion) => {
                    format!("<video src=\"{}\"{} controls></video>", reference, title)
                }
                (MediaKind::Document, _) => format!(
                    "<div data-media=\"document\"><a href=\"{}\"{}>{}</a></div>",
                    reference,
                    title,
                    caption.as_deref().unwrap_or("View file")
                ),
            }
        }
    }
}

/// Render a run of list items as nested lists.
fn render_list(items: &[Block]) -> String {
    // One entry per open nesting level: (ordered, item open).
    let mut stack: Vec<(bool, bool)> = Vec::new();
    let mut s = String::new();

    let close_level = |s: &mut String, level: (bool, bool)| {
        if level.1 {
            s.push_str("</li>");
        }
        s.push_str(if level.0 { "</ol>" } else { "</ul>" });
    };

    for block in items {
        let Block::ListItem(item) = block else {
            continue;
        };
        let levels = item.depth() + 1;
        while stack.len() > levels {
            if let Some(level) = stack.pop() {
                close_level(&mut s, level);
            }
        }
        if stack.len() == levels {
            let same_kind = stack.last().is_some_and(|l| l.0 == item.ordered());
            if same_kind {
                s.push_str("</li>");
                if let Some(top) = stack.last_mut() {
                    top.1 = false;
                }
            } else if let Some(level) = stack.pop() {
                close_level(&mut s, level);
            }
        }
        while stack.len() < levels {
            s.push_str(if item.ordered() { "<ol>" } else { "<ul>" });
            stack.push((item.ordered(), false));
        }
        s.push_str("<li>");
        s.push_str(&render_spans(item.spans()));
        if let Some(top) = stack.last_mut() {
            top.1 = true;
        }
    }
    while let Some(level) = stack.pop() {
        close_level(&mut s, level);
    }
    s
}

fn render_spans(spans: &[Span]) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < spans.len() {
        match spans[i].link() {
            Some(target) => {
                let end = spans[i..]
                    .iter()
                    .position(|s| s.link() != Some(target))
                    .map(|p| i + p)
                    .unwrap_or(spans.len());
                let inner: String = spans[i..end].iter().map(render_span).collect();
                out.push_str(&format!("<a href=\"{}\">{}</a>", escape_attr(target), inner));
                i = end;
            }
            None => {
                out.push_str(&render_span(&spans[i]));
                i += 1;
            }
        }
    }
    out
}

fn render_span(span: &Span) -> String {
    let style = span.style();
    let mut s = escape_text(span.text());
    if style.code {
        s = format!("<code>{}</code>", s);
    }
    if style.italic {
        s = format!("<i>{}</i>", s);
    }
    if style.bold {
        s = format!("<b>{}</b>", s);
    }
    s
}
