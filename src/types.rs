use serde::{Deserialize, Serialize};

/// One library item. `id` is an opaque stable identifier assigned by the
/// store; `genre` holds the raw comma-joined field as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub artist: String,
    pub album: String,
    pub title: String,
    pub genre: String,
    pub file_path: String,
}

impl Track {
    /// Parse the stored genre field into a `GenreSet`.
    pub fn genres(&self) -> GenreSet {
        GenreSet::parse(&self.genre)
    }
}

/// Ordered list of genre names with no duplicate case-insensitive entries.
///
/// Order is significant (ranked relevance) and survives the round-trip
/// through the comma+space-joined storage form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenreSet(Vec<String>);

impl GenreSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Deserialize from the stored field: split on commas, trim whitespace,
    /// drop empty segments and case-insensitive duplicates.
    pub fn parse(raw: &str) -> Self {
        let mut set = Self::new();
        for part in raw.split(',') {
            let part = part.trim();
            if !part.is_empty() {
                set.push(part.to_string());
            }
        }
        set
    }

    pub fn from_names<I: IntoIterator<Item = String>>(names: I) -> Self {
        let mut set = Self::new();
        for name in names {
            set.push(name);
        }
        set
    }

    /// Append a genre unless a case-insensitive duplicate is already present.
    pub fn push(&mut self, name: String) {
        let lower = name.to_lowercase();
        if !self.0.iter().any(|g| g.to_lowercase() == lower) {
            self.0.push(name);
        }
    }

    /// Serialize to the comma+space-joined storage form.
    pub fn join(&self) -> String {
        self.0.join(", ")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}
