//! Media reference rewriting.

use crate::block::{Block, Notation};
use std::collections::{BTreeSet, HashMap};

type Key = (Option<Notation>, String);

/// Mapping from a media reference to its address on another side of a sync.
///
/// One mapping lives for a single sync pass and is discarded after rewriting.
/// Keys are references produced by resolution or issued by a store during the
/// pass; author-written URLs are never keys, so they pass through untouched.
///
/// A key is either scoped to the Markdown notation a reference was written
/// in, or applies to a reference in any notation. Scoped keys win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaMapping {
    entries: HashMap<Key, String>,
}

const SCOPES: [Option<Notation>; 3] = [None, Some(Notation::Embed), Some(Notation::Standard)];

impl MediaMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `from` in any notation.
    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.entries.insert((None, from.into()), to.into());
    }

    /// Map `from` only where it was written in `notation`.
    pub fn insert_scoped(
        &mut self,
        notation: Notation,
        from: impl Into<String>,
        to: impl Into<String>,
    ) {
        self.entries.insert((Some(notation), from.into()), to.into());
    }

    /// Address for a reference written without a recorded notation.
    pub fn get(&self, reference: &str) -> Option<&str> {
        self.lookup(None, reference)
    }

    /// Address for a reference written in `notation`.
    pub fn lookup(&self, notation: Option<Notation>, reference: &str) -> Option<&str> {
        let scoped = notation.and_then(|n| self.entries.get(&(Some(n), reference.to_string())));
        scoped
            .or_else(|| self.entries.get(&(None, reference.to_string())))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries as `(scope, from, to)`.
    pub fn iter(&self) -> impl Iterator<Item = (Option<Notation>, &str, &str)> {
        self.entries
            .iter()
            .map(|((scope, from), to)| (*scope, from.as_str(), to.as_str()))
    }

    /// Mapping equivalent to rewriting with `self`, then with `next`.
    pub fn compose(&self, next: &MediaMapping) -> MediaMapping {
        let references: BTreeSet<&str> = self
            .entries
            .keys()
            .chain(next.entries.keys())
            .map(|(_, reference)| reference.as_str())
            .collect();

        let mut entries = HashMap::new();
        for scope in SCOPES {
            for reference in &references {
                let first = self.lookup(scope, reference);
                let moved = first.unwrap_or(reference);
                let second = next.lookup(scope, moved);
                if first.is_none() && second.is_none() {
                    continue;
                }
                let target = second.unwrap_or(moved);
                entries.insert((scope, reference.to_string()), target.to_string());
            }
        }
        MediaMapping { entries }
    }

    /// Union of both mappings; `other` wins on shared keys.
    pub fn merge(&self, other: &MediaMapping) -> MediaMapping {
        let mut entries = self.entries.clone();
        entries.extend(other.entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        MediaMapping { entries }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MediaMapping {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| ((None, k.into()), v.into()))
                .collect(),
        }
    }
}

/// Rewrite media references in a single pass.
///
/// Each media block whose reference is a key of `mapping` is replaced by a
/// new block pointing at the mapped address. Unmapped references and
/// non-media blocks are returned unchanged, in order.
pub fn rewrite(blocks: &[Block], mapping: &MediaMapping) -> Vec<Block> {
    blocks
        .iter()
        .map(|block| match block {
            Block::Media(media) => match mapping.lookup(media.notation(), media.reference()) {
                Some(address) => Block::Media(media.with_reference(address)),
                None => block.clone(),
            },
            _ => block.clone(),
        })
        .collect()
}
