//! Media reference resolution and extraction.

use crate::kind::FileKind;
use crate::reference::{code_span_ranges, find_references, MediaSyntax, Notation};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Configuration for [`MediaResolver`].
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Folder names under the root searched, in order, for embed references.
    pub media_folders: Vec<String>,
    /// Fall back to a recursive search of the root for embed references.
    pub recursive_search: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            media_folders: ["_media", "assets", "images", "attachments", "files"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            recursive_search: true,
        }
    }
}

impl ResolverConfig {
    pub fn with_media_folders(mut self, folders: Vec<String>) -> Self {
        self.media_folders = folders;
        self
    }

    pub fn with_recursive_search(mut self, enabled: bool) -> Self {
        self.recursive_search = enabled;
        self
    }
}

/// A media reference found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    pub syntax: MediaSyntax,
    /// Absolute location of the file, `None` when unresolved.
    pub location: Option<PathBuf>,
    pub kind: FileKind,
}

impl MediaReference {
    /// The reference text exactly as written.
    pub fn origin(&self) -> &str {
        &self.syntax.raw
    }

    /// The name or path the reference points at.
    pub fn target(&self) -> &str {
        &self.syntax.target
    }

    pub fn is_resolved(&self) -> bool {
        self.location.is_some()
    }
}

/// Resolves textual media references to files on disk.
#[derive(Debug, Clone, Default)]
pub struct MediaResolver {
    config: ResolverConfig,
}

impl MediaResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a reference written in either notation.
    ///
    /// Returns `None` for URLs, for text that is not a media reference, and
    /// when no candidate file exists.
    pub fn resolve(&self, reference_text: &str, document: &Path, root: &Path) -> Option<PathBuf> {
        let syntax = MediaSyntax::parse(reference_text)?;
        self.resolve_syntax(&syntax, document, root)
    }

    /// Resolve an already-parsed reference.
    pub fn resolve_syntax(
        &self,
        syntax: &MediaSyntax,
        document: &Path,
        root: &Path,
    ) -> Option<PathBuf> {
        if syntax.is_url() {
            return None;
        }
        match syntax.notation {
            Notation::Embed => self.resolve_embed(&syntax.target, document, root),
            Notation::Standard => resolve_standard(&syntax.target, document, root),
        }
    }

    fn resolve_embed(&self, name: &str, document: &Path, root: &Path) -> Option<PathBuf> {
        let mut candidates = Vec::with_capacity(self.config.media_folders.len() + 2);
        if let Some(dir) = document.parent() {
            candidates.push(dir.join(name));
        }
        candidates.push(root.join(name));
        for folder in &self.config.media_folders {
            candidates.push(root.join(folder).join(name));
        }

        if let Some(found) = candidates.into_iter().find(|c| c.is_file()) {
            debug!(reference = name, path = %found.display(), "Resolved embed reference");
            return Some(absolute(found));
        }

        if self.config.recursive_search {
            if let Some(found) = search_tree(root, Path::new(name)) {
                debug!(
                    reference = name,
                    path = %found.display(),
                    "Resolved embed reference by search"
                );
                return Some(absolute(found));
            }
        }
        None
    }

    /// Resolve a sequence of references, keeping the first of each
    /// (notation, target) pair. URL targets are skipped.
    pub fn resolve_all<I>(&self, syntaxes: I, document: &Path, root: &Path) -> Vec<MediaReference>
    where
        I: IntoIterator<Item = MediaSyntax>,
    {
        let mut seen = HashSet::new();
        let mut references = Vec::new();
        for syntax in syntaxes {
            if syntax.is_url() || !seen.insert((syntax.notation, syntax.target.clone())) {
                continue;
            }
            let location = self.resolve_syntax(&syntax, document, root);
            let kind = match &location {
                Some(path) => FileKind::classify(path),
                None => FileKind::classify(&syntax.target),
            };
            if location.is_none() {
                warn!(reference = %syntax.raw, "Unresolved media reference");
            }
            references.push(MediaReference {
                syntax,
                location,
                kind,
            });
        }
        references
    }

    /// Extract every media reference from Markdown text, resolving each.
    ///
    /// References inside fenced code or inline code spans are ignored.
    pub fn extract(&self, markdown: &str, document: &Path, root: &Path) -> Vec<MediaReference> {
        let mut syntaxes = Vec::new();
        let mut fence: Option<String> = None;

        for line in markdown.lines() {
            let trimmed = line.trim_start();
            if let Some(open) = &fence {
                if closes_fence(trimmed, open) {
                    fence = None;
                }
                continue;
            }
            if let Some(marker) = fence_marker(trimmed) {
                fence = Some(marker);
                continue;
            }

            let code = code_span_ranges(line);
            syntaxes.extend(
                find_references(line)
                    .into_iter()
                    .filter(|(range, _)| {
                        !code.iter().any(|c| c.start <= range.start && range.end <= c.end)
                    })
                    .map(|(_, syntax)| syntax),
            );
        }
        self.resolve_all(syntaxes, document, root)
    }
}

fn resolve_standard(path: &str, document: &Path, root: &Path) -> Option<PathBuf> {
    let candidate = if let Some(stripped) = path.strip_prefix('/') {
        root.join(stripped)
    } else {
        document.parent().unwrap_or(root).join(path)
    };
    if candidate.is_file() {
        Some(absolute(candidate))
    } else {
        debug!(path = %candidate.display(), "Media path does not exist");
        None
    }
}

/// Opening fence marker of a fenced code line (three or more backticks or tildes).
pub(crate) fn fence_marker(line: &str) -> Option<String> {
    let first = line.chars().next()?;
    if first != '`' && first != '~' {
        return None;
    }
    let run = line.chars().take_while(|c| *c == first).count();
    (run >= 3).then(|| first.to_string().repeat(run))
}

fn closes_fence(line: &str, open: &str) -> bool {
    fence_marker(line).is_some_and(|marker| {
        marker.starts_with(open) && line[marker.len()..].trim().is_empty()
    })
}

/// Depth-first search for a file whose path ends with `name`.
///
/// Hidden directories are skipped; entries are visited in name order.
fn search_tree(dir: &Path, name: &Path) -> Option<PathBuf> {
    let mut entries: Vec<_> = fs::read_dir(dir).ok()?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());

    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_dir() {
            if !hidden {
                subdirs.push(path);
            }
        } else if path.ends_with(name) {
            return Some(path);
        }
    }
    subdirs.into_iter().find_map(|sub| search_tree(&sub, name))
}

fn absolute(path: PathBuf) -> PathBuf {
    fs::canonicalize(&path).unwrap_or(path)
}
