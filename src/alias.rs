//! Canonical subject resolution.
//!
//! Statement sheets spell the same accounting subject many ways across years
//! ("资产合计", "资产总计", "（一）资产总计 "). The [`AliasMap`] is built once from
//! the alias table and maps every normalized spelling to exactly one canonical
//! subject together with its [`SubjectKind`].

use crate::schema::{AliasEntry, SubjectKind};
use crate::utils::to_half_width;
use log::{debug, warn};
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

fn index_marker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\([一二三四五六七八九十百零〇\d]+\)").expect("static regex")
    })
}

/// Normalizes a raw subject label for lookup: full-width punctuation becomes
/// half-width, parenthetical index markers such as `(一)` or `(3)` are removed
/// and every whitespace character is dropped.
pub fn normalize_subject_name(raw: &str) -> String {
    let half_width = to_half_width(raw);
    let without_markers = index_marker_pattern().replace_all(&half_width, "");
    without_markers.chars().filter(|c| !c.is_whitespace()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSubject {
    pub canonical: String,
    pub kind: SubjectKind,
    /// False when the label was not in the alias table and resolved to itself.
    pub known: bool,
}

/// An alias claimed by a second canonical subject. The first registration is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasCollision {
    pub alias: String,
    pub kept: String,
    pub ignored: String,
}

#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    lookup: HashMap<String, String>,
    kinds: HashMap<String, SubjectKind>,
    collisions: Vec<AliasCollision>,
}

impl AliasMap {
    pub fn build(entries: &[AliasEntry]) -> Self {
        let mut map = Self::default();

        for entry in entries {
            let canonical = entry.canonical.trim();
            if canonical.is_empty() {
                continue;
            }

            match map.kinds.get(canonical) {
                Some(existing) if *existing != entry.kind => {
                    warn!(
                        "Subject '{}' declared again as {:?}; keeping first declaration {:?}",
                        canonical, entry.kind, existing
                    );
                }
                Some(_) => {}
                None => {
                    map.kinds.insert(canonical.to_string(), entry.kind);
                }
            }

            map.register(canonical, canonical);
            for alias in &entry.aliases {
                map.register(alias, canonical);
            }
        }

        debug!(
            "Alias map built: {} spellings for {} canonical subjects ({} collisions)",
            map.lookup.len(),
            map.kinds.len(),
            map.collisions.len()
        );

        map
    }

    fn register(&mut self, alias: &str, canonical: &str) {
        let key = normalize_subject_name(alias);
        if key.is_empty() {
            return;
        }

        match self.lookup.get(&key) {
            Some(existing) if existing != canonical => {
                warn!(
                    "Alias '{}' already maps to '{}'; ignoring registration under '{}'",
                    alias, existing, canonical
                );
                self.collisions.push(AliasCollision {
                    alias: key,
                    kept: existing.clone(),
                    ignored: canonical.to_string(),
                });
            }
            Some(_) => {}
            None => {
                self.lookup.insert(key, canonical.to_string());
            }
        }
    }

    /// Resolves a raw cell label. Unknown labels resolve to their normalized
    /// form with kind ordinary; this never fails.
    pub fn resolve(&self, raw_name: &str) -> ResolvedSubject {
        let key = normalize_subject_name(raw_name);
        match self.lookup.get(&key) {
            Some(canonical) => ResolvedSubject {
                canonical: canonical.clone(),
                kind: self.kind_of(canonical),
                known: true,
            },
            None => ResolvedSubject {
                canonical: key,
                kind: SubjectKind::Ordinary,
                known: false,
            },
        }
    }

    pub fn kind_of(&self, canonical: &str) -> SubjectKind {
        self.kinds.get(canonical).copied().unwrap_or_default()
    }

    pub fn is_known(&self, raw_name: &str) -> bool {
        self.lookup.contains_key(&normalize_subject_name(raw_name))
    }

    /// Every normalized spelling that resolves to `canonical`, sorted.
    pub fn aliases_of(&self, canonical: &str) -> Vec<&str> {
        let mut aliases: Vec<&str> = self
            .lookup
            .iter()
            .filter(|(_, c)| c.as_str() == canonical)
            .map(|(alias, _)| alias.as_str())
            .collect();
        aliases.sort_unstable();
        aliases
    }

    pub fn collisions(&self) -> &[AliasCollision] {
        &self.collisions
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }
}
