//! Run summaries and the unmapped-genre listing. Pure aggregation: the
//! Reconciler feeds the counters, nothing here mutates the library.

use std::fmt;

use crate::resolver::Tier;
use crate::rules::MappingTable;

/// Counters for one batch operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub resolved_track: usize,
    pub resolved_album: usize,
    pub resolved_artist: usize,
    pub cleaned: usize,
    pub remapped: usize,
    pub split: usize,
    pub unresolved: usize,
    pub write_failures: usize,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn record_tier(&mut self, tier: Tier) {
        match tier {
            Tier::Track => self.resolved_track += 1,
            Tier::Album => self.resolved_album += 1,
            Tier::Artist => self.resolved_artist += 1,
        }
    }

    pub fn resolved(&self) -> usize {
        self.resolved_track + self.resolved_album + self.resolved_artist
    }

    pub fn changed(&self) -> usize {
        self.resolved() + self.cleaned + self.remapped + self.split
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![format!("{} processed", self.processed)];
        if self.resolved() > 0 {
            parts.push(format!(
                "{} resolved (track {}, album {}, artist {})",
                self.resolved(),
                self.resolved_track,
                self.resolved_album,
                self.resolved_artist
            ));
        }
        if self.cleaned > 0 {
            parts.push(format!("{} cleaned", self.cleaned));
        }
        if self.remapped > 0 {
            parts.push(format!("{} remapped", self.remapped));
        }
        if self.split > 0 {
            parts.push(format!("{} split", self.split));
        }
        if self.unresolved > 0 {
            parts.push(format!("{} unresolved", self.unresolved));
        }
        if self.write_failures > 0 {
            parts.push(format!("{} write failures", self.write_failures));
        }
        write!(f, "{}", parts.join(", "))?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

/// Genres present in the library but absent from the mapping table
/// (case-insensitive comparison). Input order is preserved.
pub fn unmapped_genres(library_genres: &[String], mapping: &MappingTable) -> Vec<String> {
    library_genres
        .iter()
        .filter(|g| !mapping.contains(g))
        .cloned()
        .collect()
}
