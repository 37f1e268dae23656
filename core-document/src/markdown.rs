//! # Markdown Converter
//!
//! Parses Obsidian-flavored Markdown into blocks and serializes blocks back.
//!
//! Parsing is CommonMark with GFM tables, via `comrak`. Supported: headings,
//! paragraphs, ordered and unordered lists (nesting kept as `depth`), pipe
//! tables, fenced and indented code, bold/italic/code spans, links, and media
//! references in embed and standard notation. Anything else (block quotes,
//! thematic breaks, raw HTML) degrades to a paragraph of its text.

use crate::block::{trim_edges, Block, Cell, Media, MediaKind, Span};
use crate::inline::{
    collect_inline, escape_text, longest_run, render_destination, render_inline, split_embeds,
    text_content, Inline,
};
use comrak::nodes::{AstNode, ListType, NodeValue};
use comrak::{parse_document, Arena, Options};
use core_media::{is_url, FileKind, MediaSyntax, Notation};
use std::collections::HashMap;
use tracing::debug;

/// Parse Markdown text into blocks.
pub fn parse(markdown: &str) -> Vec<Block> {
    let arena = Arena::new();
    let mut options = Options::default();
    options.extension.table = true;
    let root = parse_document(&arena, markdown, &options);

    let lines: Vec<&str> = markdown.lines().collect();
    let mut blocks = Vec::new();
    for node in root.children() {
        push_node(node, &lines, &mut blocks);
    }
    blocks
}

fn push_node<'a>(node: &'a AstNode<'a>, lines: &[&str], blocks: &mut Vec<Block>) {
    let value = node.data.borrow().value.clone();
    match value {
        NodeValue::Heading(heading) => {
            let (spans, media) = split_media(collect_inline(node));
            blocks.push(Block::heading(heading.level, trim_edges(spans)));
            blocks.extend(media);
        }
        NodeValue::Paragraph => push_paragraphs(collect_inline(node), blocks),
        NodeValue::List(_) => push_list(node, 0, lines, blocks),
        NodeValue::Table(_) => blocks.push(table_block(node)),
        NodeValue::CodeBlock(code) => {
            let text = code.literal.strip_suffix('\n').unwrap_or(&code.literal);
            blocks.push(Block::code(Some(code.info.trim().to_string()), text));
        }
        NodeValue::ThematicBreak => {
            let line = node.data.borrow().sourcepos.start.line;
            let text = lines.get(line.saturating_sub(1)).map(|l| l.trim()).unwrap_or("---");
            debug!(line, "Flattening thematic break");
            blocks.push(Block::paragraph(vec![Span::plain(text)]));
        }
        NodeValue::HtmlBlock(html) => {
            debug!("Flattening HTML block");
            push_flattened(&html.literal, blocks);
        }
        NodeValue::BlockQuote => {
            debug!("Flattening block quote");
            push_flattened(&flatten_text(node), blocks);
        }
        _ => {
            for child in node.children() {
                push_node(child, lines, blocks);
            }
        }
    }
}

fn push_list<'a>(list: &'a AstNode<'a>, depth: usize, lines: &[&str], blocks: &mut Vec<Block>) {
    let ordered = matches!(
        &list.data.borrow().value,
        NodeValue::List(l) if l.list_type == ListType::Ordered
    );
    for item in list.children() {
        let mut spans = Vec::new();
        let mut media = Vec::new();
        for child in item.children().filter(|c| is_text_block(c)) {
            let (text, lifted) = split_media(collect_inline(child));
            if !spans.is_empty() {
                spans.push(Span::plain(" "));
            }
            spans.extend(text);
            media.extend(lifted);
        }
        blocks.push(Block::list_item(ordered, depth, trim_edges(spans)));
        blocks.extend(media);

        for child in item.children().filter(|c| !is_text_block(c)) {
            if matches!(child.data.borrow().value, NodeValue::List(_)) {
                push_list(child, depth + 1, lines, blocks);
            } else {
                push_node(child, lines, blocks);
            }
        }
    }
}

fn is_text_block<'a>(node: &'a AstNode<'a>) -> bool {
    matches!(node.data.borrow().value, NodeValue::Paragraph | NodeValue::Heading(_))
}

fn table_block<'a>(table: &'a AstNode<'a>) -> Block {
    let rows: Vec<Vec<Cell>> = table
        .children()
        .map(|row| {
            row.children()
                .map(|cell| {
                    let spans = collect_inline(cell)
                        .into_iter()
                        .map(|item| match item {
                            Inline::Span(span) => span,
                            Inline::Media(syntax) => Span::plain(syntax.raw),
                        })
                        .collect();
                    trim_edges(spans)
                })
                .collect()
        })
        .collect();
    Block::table(rows)
}

/// Text of every leaf block under `node`, joined by spaces.
fn flatten_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut parts = Vec::new();
    for descendant in node.descendants() {
        match &descendant.data.borrow().value {
            NodeValue::Paragraph | NodeValue::Heading(_) | NodeValue::TableCell => {
                parts.push(text_content(descendant));
            }
            NodeValue::CodeBlock(code) => parts.push(code.literal.clone()),
            NodeValue::HtmlBlock(html) => parts.push(html.literal.clone()),
            _ => {}
        }
    }
    parts.join(" ")
}

/// Push raw text as paragraphs, one line apart from another joined by a space.
fn push_flattened(text: &str, blocks: &mut Vec<Block>) {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    push_paragraphs(split_embeds(vec![Inline::Span(Span::plain(joined))]), blocks);
}

/// Push paragraphs, splitting out media in order.
fn push_paragraphs(items: Vec<Inline>, blocks: &mut Vec<Block>) {
    let mut spans = Vec::new();
    for item in items {
        match item {
            Inline::Span(span) => spans.push(span),
            Inline::Media(syntax) => {
                push_paragraph(std::mem::take(&mut spans), blocks);
                blocks.push(media_block(syntax));
            }
        }
    }
    push_paragraph(spans, blocks);
}

fn push_paragraph(spans: Vec<Span>, blocks: &mut Vec<Block>) {
    let spans = trim_edges(spans);
    if !spans.is_empty() {
        blocks.push(Block::paragraph(spans));
    }
}

/// Spans of a text block, and the media blocks lifted out of it.
fn split_media(items: Vec<Inline>) -> (Vec<Span>, Vec<Block>) {
    let mut spans = Vec::new();
    let mut media = Vec::new();
    for item in items {
        match item {
            Inline::Span(span) => spans.push(span),
            Inline::Media(syntax) => media.push(media_block(syntax)),
        }
    }
    (spans, media)
}

fn media_block(syntax: MediaSyntax) -> Block {
    let kind = match FileKind::classify(&syntax.target) {
        FileKind::File if syntax.is_url() => MediaKind::Image,
        kind => kind.media_kind(),
    };
    Block::media_written(syntax.notation, kind, syntax.target, syntax.alt)
}

/// Serialize blocks to Markdown.
///
/// Consecutive list items share a line group; all other blocks are separated
/// by a blank line. Ordered items are numbered from 1 within each run.
pub fn serialize(blocks: &[Block]) -> String {
    let mut out = String::new();
    let mut counters: HashMap<usize, usize> = HashMap::new();
    let mut content_columns: Vec<usize> = Vec::new();
    let mut previous: Option<&Block> = None;

    for block in blocks {
        let rendered = match block {
            Block::Heading(h) => {
                let text = escape_trailing_hashes(escape_line_start(render_inline(h.spans())));
                if text.is_empty() {
                    "#".repeat(h.level() as usize)
                } else {
                    format!("{} {}", "#".repeat(h.level() as usize), text)
                }
            }
            Block::Paragraph(p) => escape_line_start(render_inline(p.spans())),
            Block::ListItem(item) => {
                if !matches!(previous, Some(Block::ListItem(_))) {
                    counters.clear();
                    content_columns.clear();
                }
                counters.retain(|depth, _| *depth <= item.depth());
                let marker = if item.ordered() {
                    let n = counters.entry(item.depth()).or_insert(0);
                    *n += 1;
                    format!("{}.", n)
                } else {
                    counters.remove(&item.depth());
                    "-".to_string()
                };
                content_columns.truncate(item.depth());
                while content_columns.len() < item.depth() {
                    let next = content_columns.last().map_or(2, |c| c + 2);
                    content_columns.push(next);
                }
                let indent = content_columns.last().copied().unwrap_or(0);
                content_columns.push(indent + marker.len() + 1);

                let text = escape_line_start(render_inline(item.spans()));
                let line = format!("{}{} {}", " ".repeat(indent), marker, text);
                line.trim_end().to_string()
            }
            Block::Table(table) => {
                if table.column_count() == 0 {
                    continue;
                }
                let render_row = |row: &Vec<Cell>| {
                    let cells: Vec<String> = row
                        .iter()
                        .map(|cell| render_inline(cell).replace('|', "\\|"))
                        .collect();
                    format!("| {} |", cells.join(" | "))
                };
                let mut lines = vec![render_row(&table.rows()[0])];
                lines.push(format!("|{}", " --- |".repeat(table.column_count())));
                lines.extend(table.rows()[1..].iter().map(render_row));
                lines.join("\n")
            }
            Block::CodeBlock(code) => {
                let use_tilde = code.language().is_some_and(|l| l.contains('`'));
                let ch = if use_tilde { '~' } else { '`' };
                let fence = ch.to_string().repeat(3.max(longest_run(code.text(), ch) + 1));
                let mut s = format!("{}{}\n", fence, code.language().unwrap_or(""));
                if !code.text().is_empty() {
                    s.push_str(code.text());
                    s.push('\n');
                }
                s.push_str(&fence);
                s
            }
            Block::Media(media) => render_media(media),
        };

        if previous.is_some() {
            let tight = matches!(previous, Some(Block::ListItem(_)))
                && matches!(block, Block::ListItem(_));
            out.push_str(if tight { "\n" } else { "\n\n" });
        }
        out.push_str(&rendered);
        previous = Some(block);
    }

    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Media in the notation it was written in, when that notation can carry
/// the reference and caption; otherwise whichever notation can.
fn render_media(media: &Media) -> String {
    let reference = media.reference();
    let caption = media.caption().filter(|c| !c.trim().is_empty());
    let plain = |text: &str| {
        !text.contains(['[', ']', '|', '*', '_', '`', '\\', '<', '&', '\n'])
    };
    let embeddable =
        !reference.trim().is_empty() && plain(reference) && caption.map_or(true, plain);

    let notation = match media.notation() {
        Some(Notation::Embed) if embeddable => Notation::Embed,
        Some(_) => Notation::Standard,
        None if embeddable && !reference.contains(['/', '>']) && !is_url(reference) => {
            Notation::Embed
        }
        None => Notation::Standard,
    };
    match (notation, caption) {
        (Notation::Embed, Some(c)) => format!("![[{}|{}]]", reference, c),
        (Notation::Embed, None) => format!("![[{}]]", reference),
        (Notation::Standard, caption) => format!(
            "![{}]({})",
            escape_text(caption.unwrap_or_default()),
            render_destination(reference)
        ),
    }
}

/// Escape a leading character that would otherwise start a block construct.
fn escape_line_start(text: String) -> String {
    let Some(first) = text.chars().next() else {
        return text;
    };
    if matches!(first, '#' | '>' | '-' | '+' | '~' | '!') {
        return format!("\\{}", text);
    }
    let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && matches!(text[digits..].chars().next(), Some('.') | Some(')')) {
        return format!("{}\\{}", &text[..digits], &text[digits..]);
    }
    text
}

fn escape_trailing_hashes(text: String) -> String {
    let trimmed = text.trim_end_matches('#');
    if trimmed.len() == text.len() || trimmed.ends_with('\\') {
        return text;
    }
    format!("{}\\{}", trimmed, &text[trimmed.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::SpanStyle;

    fn text_of(block: &Block) -> String {
        block.plain_text()
    }

    #[test]
    fn test_empty_document() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n  \n").is_empty());
        assert_eq!(serialize(&[]), "");
    }

    #[test]
    fn test_headings_and_paragraphs() {
        let blocks = parse("# Title #\n\nFirst line\ncontinues here.\n\n#nospace\n\n###### Six");
        assert_eq!(blocks.len(), 4);
        assert!(matches!(&blocks[0], Block::Heading(h) if h.level() == 1));
        assert_eq!(text_of(&blocks[0]), "Title");
        assert_eq!(text_of(&blocks[1]), "First line continues here.");
        assert!(matches!(&blocks[2], Block::Paragraph(_)));
        assert!(matches!(&blocks[3], Block::Heading(h) if h.level() == 6));
    }

    #[test]
    fn test_lists_keep_depth_and_order() {
        let blocks = parse("- one\n  - nested\n    wrapped\n1. first\n2. second");
        let items: Vec<(bool, usize, String)> = blocks
            .iter()
            .map(|b| match b {
                Block::ListItem(l) => (l.ordered(), l.depth(), b.plain_text()),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            items,
            vec![
                (false, 0, "one".to_string()),
                (false, 1, "nested wrapped".to_string()),
                (true, 0, "first".to_string()),
                (true, 0, "second".to_string()),
            ]
        );
        let rendered = serialize(&blocks);
        assert!(rendered.contains("1. first\n2. second"));
    }

    #[test]
    fn test_fenced_code_is_byte_exact() {
        let source = "```rust title\nfn main() {\n\n    let x = **1**;\n}\n```\n";
        let blocks = parse(source);
        assert_eq!(
            blocks,
            vec![Block::code(
                Some("rust title".into()),
                "fn main() {\n\n    let x = **1**;\n}"
            )]
        );
        assert_eq!(parse(&serialize(&blocks)), blocks);
    }

    #[test]
    fn test_unclosed_fence_runs_to_end() {
        let blocks = parse("text\n\n~~~\nbody\n# not heading");
        assert_eq!(blocks[1], Block::code(None, "body\n# not heading"));
    }

    #[test]
    fn test_code_containing_fences_gets_longer_fence() {
        let blocks = vec![Block::code(Some("md".into()), "```\ninner\n```")];
        let rendered = serialize(&blocks);
        assert!(rendered.starts_with("````md\n"));
        assert_eq!(parse(&rendered), blocks);
    }

    #[test]
    fn test_table_scenario() {
        let blocks = parse("| A | B |\n|---|---|\n| 1 | 2 |\n");
        let expected = Block::table(vec![
            vec![vec![Span::plain("A")], vec![Span::plain("B")]],
            vec![vec![Span::plain("1")], vec![Span::plain("2")]],
        ]);
        assert_eq!(blocks, vec![expected.clone()]);

        let rendered = serialize(&blocks);
        assert_eq!(rendered, "| A | B |\n| --- | --- |\n| 1 | 2 |\n");
        assert_eq!(parse(&rendered), vec![expected]);
    }

    #[test]
    fn test_table_ragged_rows_and_escaped_pipes() {
        let blocks = parse("| A | B | C |\n| - | - | - |\n| x \\| y |\n");
        let Block::Table(table) = &blocks[0] else {
            panic!("expected table");
        };
        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.rows()[1].len(), 3);
        assert_eq!(table.rows()[1][0], vec![Span::plain("x | y")]);
        assert_eq!(parse(&serialize(&blocks)), blocks);
    }

    #[test]
    fn test_media_lines_and_inline_media() {
        let blocks =
            parse("![[photo.png|Sunset]]\n\nBefore ![clip](media/v.mp4) after `![[not.png]]`");
        assert_eq!(
            blocks,
            vec![
                Block::media_written(
                    Notation::Embed,
                    MediaKind::Image,
                    "photo.png",
                    Some("Sunset".into())
                ),
                Block::paragraph(vec![Span::plain("Before")]),
                Block::media_written(
                    Notation::Standard,
                    MediaKind::Video,
                    "media/v.mp4",
                    Some("clip".into())
                ),
                Block::paragraph(vec![
                    Span::plain("after "),
                    Span::new("![[not.png]]", SpanStyle::code()),
                ]),
            ]
        );
        assert_eq!(parse(&serialize(&blocks)), blocks);
    }

    #[test]
    fn test_unknown_constructs_flatten_to_paragraphs() {
        let blocks = parse("> quoted *text*\n> more\n\n---\n\n<div>raw</div>");
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|b| matches!(b, Block::Paragraph(_))));
        assert_eq!(blocks[0].plain_text(), "quoted text more");
        assert_eq!(blocks[1].plain_text(), "---");
        assert_eq!(blocks[2].plain_text(), "<div>raw</div>");
        assert_eq!(parse(&serialize(&blocks)), blocks);
    }

    #[test]
    fn test_round_trip_on_mixed_document() {
        let source = "\
# Release *notes*

Intro with **bold**, _italic_, `code` and a [link](https://example.com).

## Steps

1. Install
2. Run `cargo build`
   - with **flags**

![[diagram.png]]

| Name | Value |
| :--- | ---: |
| a | `b\\|c` |

- 1. literal
- # hash

Final paragraph ending with # and 3) markers.
";
        let parsed = parse(source);
        assert_eq!(parse(&serialize(&parsed)), parsed);
    }

    #[test]
    fn test_empty_list_item_before_paragraph() {
        let blocks = parse("\n*\nhttp://u*---");
        assert_eq!(
            blocks,
            vec![
                Block::list_item(false, 0, vec![]),
                Block::paragraph(vec![Span::plain("http://u*---")]),
            ]
        );
        let rendered = serialize(&blocks);
        assert_eq!(rendered, "-\n\nhttp://u\\*---\n");
        assert_eq!(parse(&rendered), blocks);
    }

    #[test]
    fn test_list_continuation_lines_join_without_gaps() {
        let blocks = parse("- first\n  second\n-\n- third");
        let texts: Vec<String> = blocks.iter().map(Block::plain_text).collect();
        assert_eq!(texts, vec!["first second", "", "third"]);
        assert_eq!(parse(&serialize(&blocks)), blocks);
    }

    #[test]
    fn test_nested_items_under_ordered_markers() {
        let blocks = vec![
            Block::list_item(true, 0, vec![Span::plain("parent")]),
            Block::list_item(false, 1, vec![Span::plain("child")]),
            Block::list_item(true, 2, vec![Span::plain("grandchild")]),
        ];
        let rendered = serialize(&blocks);
        assert_eq!(rendered, "1. parent\n   - child\n     1. grandchild\n");
        assert_eq!(parse(&rendered), blocks);
    }

    #[test]
    fn test_notation_is_kept_for_the_same_target() {
        let source = "![[a.png]]\n\n![std](a.png)\n\n![[sub/b.png]]\n";
        let blocks = parse(source);
        let notations: Vec<Option<Notation>> =
            blocks.iter().filter_map(Block::as_media).map(|m| m.notation()).collect();
        assert_eq!(
            notations,
            vec![Some(Notation::Embed), Some(Notation::Standard), Some(Notation::Embed)]
        );
        assert_eq!(serialize(&blocks), source);
    }

    #[test]
    fn test_captions_with_markup_survive() {
        let media = Block::media(MediaKind::Image, "a.png", Some("fig [1] | *draft*".into()));
        let rendered = serialize(std::slice::from_ref(&media));
        assert_eq!(rendered, "![fig \\[1\\] | \\*draft\\*](a.png)\n");

        let parsed = parse(&rendered);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].to_portable(), media);
    }

    #[test]
    fn test_whitespace_inside_code_and_text_is_kept() {
        let blocks = parse("Column\tvalue and `a\tb`\n\n`  `\n");
        assert_eq!(
            blocks,
            vec![
                Block::paragraph(vec![
                    Span::plain("Column\tvalue and "),
                    Span::new("a\tb", SpanStyle::code()),
                ]),
                Block::paragraph(vec![Span::new("  ", SpanStyle::code())]),
            ]
        );
        assert_eq!(parse(&serialize(&blocks)), blocks);
    }

    #[test]
    fn test_escaped_text_is_not_markup() {
        let blocks = vec![Block::paragraph(vec![Span::plain(
            "5 * 3 = _x_ & <b>not bold</b> [ref]",
        )])];
        assert_eq!(parse(&serialize(&blocks)), blocks);
    }
}
