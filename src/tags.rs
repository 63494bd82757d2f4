//! On-disk genre field access using `lofty`.
//!
//! The store flushes genre updates through here on commit, and the Split
//! operation rewrites comma-joined genre entries as repeated tag entries.
//! All functions are synchronous read-modify-write passes over one file.

use std::path::Path;

use lofty::config::{ParseOptions, ParsingMode, WriteOptions};
use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, ItemValue, Tag, TagItem, TagType};

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    /// lofty open/read/write failures.
    #[error("{0}")]
    Io(String),
    /// No tags found in file.
    #[error("No tags found in file")]
    NoTags,
}

/// Extensions the library scan considers audio files.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "flac", "wav", "aiff", "aif"];

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Tag fields read during a library scan.
#[derive(Debug, Clone, Default)]
pub struct FileTags {
    pub artist: String,
    pub album: String,
    pub title: String,
    pub genre: String,
}

fn parse_options() -> ParseOptions {
    ParseOptions::new().parsing_mode(ParsingMode::Relaxed)
}

fn read_tagged(path: &Path) -> Result<lofty::file::TaggedFile, TagError> {
    Probe::open(path)
        .map_err(|e| TagError::Io(format!("Failed to open: {e}")))?
        .options(parse_options())
        .read()
        .map_err(|e| TagError::Io(format!("Failed to read: {e}")))
}

/// The tag type carrying metadata for this file: the primary type when a
/// tag of it exists, else the first present tag's type.
fn existing_tag_type(tagged: &lofty::file::TaggedFile) -> Option<TagType> {
    tagged
        .primary_tag()
        .or_else(|| tagged.first_tag())
        .map(|t| t.tag_type())
}

/// All genre entries of a tag, joined back into the comma+space form.
fn joined_genres(tag: &Tag) -> String {
    tag.get_strings(&ItemKey::Genre)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read the genre field (repeated entries joined with ", "). A file with no
/// tags reads as an empty field.
pub fn read_genre_field(path: &Path) -> Result<String, TagError> {
    let tagged = read_tagged(path)?;
    let genre = match existing_tag_type(&tagged).and_then(|tt| tagged.tag(tt)) {
        Some(tag) => joined_genres(tag),
        None => String::new(),
    };
    Ok(genre)
}

/// Read the fields the library scan needs. Artist prefers the album artist
/// (the lookup identity) over the track artist.
pub fn read_file_tags(path: &Path) -> Result<FileTags, TagError> {
    let tagged = read_tagged(path)?;
    let Some(tag) = existing_tag_type(&tagged).and_then(|tt| tagged.tag(tt)) else {
        return Ok(FileTags::default());
    };

    let get = |key: ItemKey| tag.get_string(&key).unwrap_or("").to_string();
    let artist = match tag.get_string(&ItemKey::AlbumArtist) {
        Some(a) if !a.is_empty() => a.to_string(),
        _ => get(ItemKey::TrackArtist),
    };

    Ok(FileTags {
        artist,
        album: get(ItemKey::AlbumTitle),
        title: get(ItemKey::TrackTitle),
        genre: joined_genres(tag),
    })
}

/// Write the genre field as a single comma-joined entry. An empty value
/// removes the field. Skips the file write entirely when the stored value
/// already matches.
pub fn write_genre_field(path: &Path, value: &str) -> Result<(), TagError> {
    let mut tagged = read_tagged(path)?;

    let tag_type = match existing_tag_type(&tagged) {
        Some(tt) => tt,
        None => {
            let tt = tagged.primary_tag_type();
            tagged.insert_tag(Tag::new(tt));
            tt
        }
    };
    let tag = tagged.tag_mut(tag_type).ok_or(TagError::NoTags)?;

    if joined_genres(tag) == value {
        return Ok(());
    }

    tag.remove_key(&ItemKey::Genre);
    if !value.is_empty() {
        tag.insert_text(ItemKey::Genre, value.to_string());
    }

    tag.save_to_path(path, WriteOptions::default())
        .map_err(|e| TagError::Io(format!("Failed to write: {e}")))
}

/// Outcome of a per-file split pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitOutcome {
    /// The comma-joined entry was rewritten as these repeated entries.
    Converted(Vec<String>),
    /// No comma-joined value present; file untouched.
    Unchanged,
}

/// Rewrite a comma-joined genre entry as one tag entry per genre.
///
/// Only the first genre entry is inspected (a previously split file keeps
/// its repeated entries and reports `Unchanged`), which makes the pass
/// idempotent per file.
pub fn split_genre_field(path: &Path) -> Result<SplitOutcome, TagError> {
    let mut tagged = read_tagged(path)?;
    let Some(tag_type) = existing_tag_type(&tagged) else {
        return Ok(SplitOutcome::Unchanged);
    };
    let tag = tagged.tag_mut(tag_type).ok_or(TagError::NoTags)?;

    let first = tag.get_string(&ItemKey::Genre).unwrap_or("").to_string();
    if !first.contains(',') {
        return Ok(SplitOutcome::Unchanged);
    }

    let values = split_values(&first);
    tag.remove_key(&ItemKey::Genre);
    for value in &values {
        tag.push(TagItem::new(ItemKey::Genre, ItemValue::Text(value.clone())));
    }

    tag.save_to_path(path, WriteOptions::default())
        .map_err(|e| TagError::Io(format!("Failed to write: {e}")))?;

    Ok(SplitOutcome::Converted(values))
}

fn split_values(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_values_trims_and_drops_empties() {
        assert_eq!(
            split_values("Metal, Pop ,, 90s"),
            vec!["Metal", "Pop", "90s"]
        );
        assert_eq!(split_values("Solo"), vec!["Solo"]);
    }

    #[test]
    fn audio_extension_check_is_case_insensitive() {
        assert!(is_audio_file(Path::new("/music/a.FLAC")));
        assert!(is_audio_file(Path::new("/music/a.mp3")));
        assert!(!is_audio_file(Path::new("/music/cover.jpg")));
        assert!(!is_audio_file(Path::new("/music/noext")));
    }

    #[test]
    fn unreadable_file_reports_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("not-audio.flac");
        std::fs::write(&path, b"not a real flac").expect("write fixture");

        let err = read_genre_field(&path).expect_err("bogus file must not parse");
        assert!(matches!(err, TagError::Io(_)));
    }

    #[test]
    fn missing_file_reports_io_error() {
        let err = read_genre_field(Path::new("/nonexistent/track.mp3"))
            .expect_err("missing file must error");
        assert!(matches!(err, TagError::Io(_)));
    }
}
