//! Inline Markdown: spans out of the parsed tree, and spans back to text.

use crate::block::{normalize_spans, Span, SpanStyle};
use comrak::nodes::{AstNode, NodeValue};
use core_media::{find_references, MediaSyntax, Notation};

/// An inline item: a span of text, or a media reference to lift out into
/// its own block.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inline {
    Span(Span),
    Media(MediaSyntax),
}

/// Inline content of a parsed node, with embed references split out of
/// plain text.
pub(crate) fn collect_inline<'a>(node: &'a AstNode<'a>) -> Vec<Inline> {
    let mut items = Vec::new();
    collect_into(node, SpanStyle::PLAIN, None, &mut items);
    split_embeds(items)
}

fn collect_into<'a>(
    node: &'a AstNode<'a>,
    style: SpanStyle,
    link: Option<&str>,
    out: &mut Vec<Inline>,
) {
    for child in node.children() {
        let value = child.data.borrow().value.clone();
        match value {
            NodeValue::Text(text) | NodeValue::HtmlInline(text) => {
                out.push(Inline::Span(make_span(text.to_string(), style, link)));
            }
            NodeValue::Code(code) => {
                let code_style = SpanStyle { code: true, ..style };
                out.push(Inline::Span(make_span(code.literal.clone(), code_style, link)));
            }
            NodeValue::SoftBreak | NodeValue::LineBreak => {
                out.push(Inline::Span(make_span(" ".to_string(), style, link)));
            }
            NodeValue::Emph => {
                collect_into(child, SpanStyle { italic: true, ..style }, link, out);
            }
            NodeValue::Strong => {
                collect_into(child, SpanStyle { bold: true, ..style }, link, out);
            }
            NodeValue::Link(target) => collect_into(child, style, Some(&target.url), out),
            NodeValue::Image(target) => {
                let alt = text_content(child);
                if target.url.trim().is_empty() {
                    out.push(Inline::Span(make_span(alt, style, link)));
                } else {
                    out.push(Inline::Media(MediaSyntax::new(
                        Notation::Standard,
                        target.url.clone(),
                        Some(alt),
                    )));
                }
            }
            _ => collect_into(child, style, link, out),
        }
    }
}

/// Concatenated text of every descendant, line breaks as spaces.
pub(crate) fn text_content<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    for descendant in node.descendants() {
        match &descendant.data.borrow().value {
            NodeValue::Text(t) | NodeValue::HtmlInline(t) => text.push_str(t),
            NodeValue::Code(code) => text.push_str(&code.literal),
            NodeValue::SoftBreak | NodeValue::LineBreak => text.push(' '),
            _ => {}
        }
    }
    text
}

fn make_span(text: String, style: SpanStyle, link: Option<&str>) -> Span {
    let span = Span::new(text, style);
    match link {
        Some(target) => span.with_link(target),
        None => span,
    }
}

/// Lift `![[name]]` references out of plain, unlinked text.
pub(crate) fn split_embeds(items: Vec<Inline>) -> Vec<Inline> {
    let mut out = Vec::with_capacity(items.len());
    let mut pending: Vec<Span> = Vec::new();

    let flush = |pending: &mut Vec<Span>, out: &mut Vec<Inline>| {
        for span in normalize_spans(std::mem::take(pending)) {
            if span.style().code || span.link().is_some() {
                out.push(Inline::Span(span));
                continue;
            }
            let text = span.text();
            let mut last = 0;
            for (range, syntax) in find_references(text) {
                if syntax.notation != Notation::Embed {
                    continue;
                }
                if range.start > last {
                    out.push(Inline::Span(span.with_text(&text[last..range.start])));
                }
                out.push(Inline::Media(syntax));
                last = range.end;
            }
            if last < text.len() {
                out.push(Inline::Span(span.with_text(&text[last..])));
            }
        }
    };

    for item in items {
        match item {
            Inline::Span(span) => pending.push(span),
            media => {
                flush(&mut pending, &mut out);
                out.push(media);
            }
        }
    }
    flush(&mut pending, &mut out);
    out
}

const ESCAPED: &[char] = &['\\', '`', '*', '_', '[', ']', '<', '&'];

/// Escape Markdown metacharacters in plain text.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ESCAPED.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Render spans as inline Markdown.
pub fn render_inline(spans: &[Span]) -> String {
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
                let label: String = spans[i..end].iter().map(render_span).collect();
                out.push('[');
                out.push_str(&label);
                out.push_str("](");
                out.push_str(&render_destination(target));
                out.push(')');
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

/// Link or image destination, in angle brackets when the bare form would
/// not survive parsing.
pub(crate) fn render_destination(target: &str) -> String {
    let needs_angle = target.is_empty()
        || target.contains(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '<' | '>'));
    if needs_angle {
        format!("<{}>", target.replace('<', "\\<").replace('>', "\\>"))
    } else {
        target.to_string()
    }
}

fn render_span(span: &Span) -> String {
    let style = span.style();
    let text = span.text();

    let body = if style.code {
        let longest = longest_run(text, '`');
        let fence = "`".repeat(longest + 1);
        let pad = text.starts_with('`')
            || text.ends_with('`')
            || (text.starts_with(' ') && text.ends_with(' ') && !text.trim().is_empty());
        if pad {
            format!("{fence} {text} {fence}")
        } else {
            format!("{fence}{text}{fence}")
        }
    } else {
        escape_text(text.trim())
    };

    let marker = match (style.bold, style.italic) {
        (true, true) => "***",
        (true, false) => "**",
        (false, true) => "*",
        (false, false) => "",
    };
    if marker.is_empty() {
        return if style.code { body } else { escape_text(text) };
    }

    // Emphasis must hug non-whitespace, so surrounding blanks stay outside.
    let (lead, trail) = if style.code {
        ("", "")
    } else {
        let lead_len = text.len() - text.trim_start().len();
        let trail_len = text.len() - text.trim_end().len();
        (&text[..lead_len], &text[text.len() - trail_len..])
    };
    if body.is_empty() {
        return format!("{lead}{trail}");
    }
    format!("{lead}{marker}{body}{marker}{trail}")
}

pub(crate) fn longest_run(text: &str, c: char) -> usize {
    text.split(|ch| ch != c).map(|run| run.chars().count()).max().unwrap_or(0)
}
