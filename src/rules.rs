//! Blacklist and mapping rules applied to genre names.
//!
//! Pure data and pure functions: loading lives in `config`, application
//! lives here. Both the Resolver (candidate filtering) and the Reconciler
//! (cleanup/remap passes) go through these.

use std::collections::{HashMap, HashSet};

use crate::types::GenreSet;

/// Rejection rules. Terms are stored lowercase; matching is done against the
/// lowercased genre name. Any genre containing a decimal digit is rejected
/// regardless of the configured terms.
#[derive(Debug, Clone, Default)]
pub struct BlacklistRules {
    pub exact: HashSet<String>,
    pub contains: Vec<String>,
}

impl BlacklistRules {
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.contains.is_empty()
    }
}

/// True iff the genre is rejected: exact term match, substring term match,
/// or any decimal digit in the name.
pub fn is_rejected(genre: &str, rules: &BlacklistRules) -> bool {
    let lower = genre.to_lowercase();
    let lower = lower.trim();

    if rules.exact.contains(lower) {
        return true;
    }
    if rules.contains.iter().any(|term| lower.contains(term.as_str())) {
        return true;
    }
    genre.chars().any(|c| c.is_ascii_digit())
}

/// Drop rejected genres, preserving the relative order of survivors.
pub fn filter_rejected(genres: &GenreSet, rules: &BlacklistRules) -> GenreSet {
    GenreSet::from_names(
        genres
            .iter()
            .filter(|g| !is_rejected(g, rules))
            .map(String::from),
    )
}

/// What to do with a genre that has no mapping entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultTransform {
    /// Leave the name untouched (cleanup/remap passes).
    Verbatim,
    /// Title-case the name (initial creation via the Resolver).
    TitleCase,
}

/// Rename table from lowercase genre name to canonical display string.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: HashMap<String, String>,
}

impl MappingTable {
    /// Build from raw entries; keys are lowercased.
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
        }
    }

    pub fn get(&self, genre: &str) -> Option<&str> {
        self.entries.get(&genre.to_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, genre: &str) -> bool {
        self.entries.contains_key(&genre.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Substitute mapped names; unmapped names get the default transform.
///
/// Callers decide whether anything changed by comparing the result against
/// the input set; a mapping entry that maps a genre to itself therefore
/// counts as no change.
pub fn apply_mapping(
    genres: &GenreSet,
    table: &MappingTable,
    default: DefaultTransform,
) -> GenreSet {
    GenreSet::from_names(genres.iter().map(|genre| match table.get(genre) {
        Some(mapped) => mapped.to_string(),
        None => match default {
            DefaultTransform::Verbatim => genre.to_string(),
            DefaultTransform::TitleCase => title_case(genre),
        },
    }))
}

/// Title-case a genre name: every alphabetic character following a
/// non-alphabetic one is uppercased, the rest are lowercased. Word
/// boundaries are any non-alphabetic character, so "hip-hop" becomes
/// "Hip-Hop" and "r&b" becomes "R&B".
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
