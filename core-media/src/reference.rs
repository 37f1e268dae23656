//! Media reference syntax.
//!
//! Recognises the embed (`![[name]]`) and standard (`![alt](path)`) notations
//! inside a line of Markdown text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

static MEDIA_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"!\[\[(?P<embed>[^\]|]+)(?:\|(?P<alias>[^\]]*))?\]\]"#,
        r#"|!\[(?P<alt>[^\]]*)\]\(\s*(?:<(?P<angle>[^>]+)>|(?P<path>[^)\s]+))"#,
        r#"(?:\s+"[^"]*")?\s*\)"#,
    ))
    .expect("media reference pattern is valid")
});

/// Notation a media reference was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Notation {
    /// `![[name]]`
    Embed,
    /// `![alt](path)`
    Standard,
}

/// A media reference as written in the source text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaSyntax {
    pub notation: Notation,
    /// Name or path the reference points at.
    pub target: String,
    /// Alt text (standard) or alias (embed), if non-empty.
    pub alt: Option<String>,
    /// The full reference text, e.g. `![[a.png]]`.
    pub raw: String,
}

impl MediaSyntax {
    /// A reference written in its canonical form for `notation`.
    pub fn new(notation: Notation, target: impl Into<String>, alt: Option<String>) -> Self {
        let target = target.into();
        let alt = alt.filter(|a| !a.trim().is_empty());
        let raw = match (notation, &alt) {
            (Notation::Embed, Some(alias)) => format!("![[{}|{}]]", target, alias),
            (Notation::Embed, None) => format!("![[{}]]", target),
            (Notation::Standard, alt) => {
                format!("![{}]({})", alt.as_deref().unwrap_or_default(), target)
            }
        };
        Self {
            notation,
            target,
            alt,
            raw,
        }
    }

    /// Parse text that consists of exactly one media reference.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let (range, syntax) = find_references(trimmed).into_iter().next()?;
        (range.start == 0 && range.end == trimmed.len()).then_some(syntax)
    }

    pub fn is_url(&self) -> bool {
        is_url(&self.target)
    }
}

/// Whether a target is an http(s) URL rather than a local path.
pub fn is_url(target: &str) -> bool {
    let lower = target.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Byte ranges of the inline code spans in `line`, backslash escapes honoured.
pub fn code_span_ranges(line: &str) -> Vec<Range<usize>> {
    let bytes = line.as_bytes();
    let run_at = |i: usize| bytes[i..].iter().take_while(|b| **b == b'`').count();
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => {
                let run = run_at(i);
                let mut j = i + run;
                let mut close = None;
                while j < bytes.len() {
                    if bytes[j] != b'`' {
                        j += 1;
                        continue;
                    }
                    let len = run_at(j);
                    if len == run {
                        close = Some(j + len);
                        break;
                    }
                    j += len;
                }
                match close {
                    Some(end) => {
                        ranges.push(i..end);
                        i = end;
                    }
                    None => i += run,
                }
            }
            _ => i += 1,
        }
    }
    ranges
}

/// Find every media reference in `text`, in order of appearance.
pub fn find_references(text: &str) -> Vec<(Range<usize>, MediaSyntax)> {
    MEDIA_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let non_empty = |s: &str| {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            };

            let syntax = if let Some(embed) = caps.name("embed") {
                MediaSyntax {
                    notation: Notation::Embed,
                    target: embed.as_str().trim().to_string(),
                    alt: caps.name("alias").and_then(|m| non_empty(m.as_str())),
                    raw: whole.as_str().to_string(),
                }
            } else {
                let target = caps.name("angle").or_else(|| caps.name("path"))?;
                MediaSyntax {
                    notation: Notation::Standard,
                    target: target.as_str().trim().to_string(),
                    alt: caps.name("alt").and_then(|m| non_empty(m.as_str())),
                    raw: whole.as_str().to_string(),
                }
            };
            Some((whole.range(), syntax))
        })
        .collect()
}
