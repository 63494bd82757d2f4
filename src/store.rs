//! The track store: a SQLite library database plus the on-disk tag flush.
//!
//! The database is the working copy: batch operations read and update the
//! `genre` column, and `commit` flushes the touched rows out to the audio
//! files' tags. Per-file flush failures are counted, never fatal.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, params};

use crate::tags;
use crate::types::{GenreSet, Track};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("{0}")]
    Tag(#[from] tags::TagError),
    #[error("{0}")]
    Io(String),
}

/// Track selection for batch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenreFilter {
    /// Genre field is empty (Fill candidates).
    MissingGenre,
    /// Genre field is non-empty (Clean/Remap candidates).
    HasGenre,
    /// Genre field physically contains a comma (Split candidates).
    CommaInGenre,
    All,
}

/// Per-file tally of a commit flush.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitReport {
    pub written: usize,
    pub failed: usize,
}

/// The narrow store contract the Reconciler runs against.
pub trait TrackStore {
    fn query(&self, filter: GenreFilter) -> Result<Vec<Track>, StoreError>;

    /// Update one track's genre field. Failure is non-fatal to a batch.
    fn write_genre(&mut self, track_id: &str, genres: &GenreSet) -> Result<(), StoreError>;

    /// Flush updated genre fields to persisted tag storage. Called once at
    /// the end of each mutating operation.
    fn commit(&mut self) -> Result<CommitReport, StoreError>;

    /// Re-read genre fields from the files backing the given tracks (used
    /// after Split rewrites storage underneath the database).
    fn refresh_from_files(&mut self, track_ids: &[String]) -> Result<(), StoreError>;

    /// All distinct genre names present in the library, sorted.
    fn distinct_genres(&self) -> Result<Vec<String>, StoreError>;
}

pub fn default_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("genrebridge")
        .join("library.sqlite3")
}

const TRACK_SELECT: &str = "SELECT id, artist, album, title, genre, path FROM items";

fn row_to_track(row: &rusqlite::Row) -> Result<Track, rusqlite::Error> {
    Ok(Track {
        id: row.get::<_, i64>(0)?.to_string(),
        artist: row.get(1)?,
        album: row.get(2)?,
        title: row.get(3)?,
        genre: row.get(4)?,
        file_path: row.get(5)?,
    })
}

/// Outcome of a scan-time upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

pub struct SqliteLibrary {
    conn: Connection,
    dirty: HashSet<String>,
}

impl SqliteLibrary {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Io(format!(
                    "failed to create parent directory {} for {}: {e}",
                    parent.display(),
                    path.display()
                ))
            })?;
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Self {
        Self::init(Connection::open_in_memory().expect("in-memory db")).expect("migrate")
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;",
        )?;
        migrate(&conn)?;
        Ok(Self {
            conn,
            dirty: HashSet::new(),
        })
    }

    /// Insert or refresh one scanned file. Scan wins over the database for
    /// every field; the files are the source of truth at scan time.
    pub fn upsert_file(
        &mut self,
        path: &str,
        fields: &tags::FileTags,
    ) -> Result<UpsertOutcome, StoreError> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM items WHERE path = ?1",
                params![path],
                |_| Ok(()),
            )
            .map(|_| true)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(other),
            })?;

        self.conn.execute(
            "INSERT INTO items (path, artist, album, title, genre)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(path) DO UPDATE SET
                 artist = excluded.artist,
                 album = excluded.album,
                 title = excluded.title,
                 genre = excluded.genre",
            params![path, fields.artist, fields.album, fields.title, fields.genre],
        )?;

        Ok(if exists {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn path_and_genre(&self, track_id: &str) -> Result<(String, String), StoreError> {
        let row = self.conn.query_row(
            "SELECT path, genre FROM items WHERE id = ?1",
            params![track_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;
        Ok(row)
    }

    #[cfg(test)]
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }
}

fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY,
            path TEXT NOT NULL UNIQUE,
            artist TEXT NOT NULL DEFAULT '',
            album TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            genre TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS idx_items_artist ON items(artist);
        PRAGMA user_version = 1;",
    )?;
    Ok(())
}

impl TrackStore for SqliteLibrary {
    fn query(&self, filter: GenreFilter) -> Result<Vec<Track>, StoreError> {
        let clause = match filter {
            GenreFilter::MissingGenre => " WHERE TRIM(genre) = ''",
            GenreFilter::HasGenre => " WHERE TRIM(genre) <> ''",
            GenreFilter::CommaInGenre => " WHERE instr(genre, ',') > 0",
            GenreFilter::All => "",
        };
        let sql = format!("{TRACK_SELECT}{clause} ORDER BY artist, album, title, id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_track)?;
        let mut tracks = Vec::new();
        for row in rows {
            tracks.push(row?);
        }
        Ok(tracks)
    }

    fn write_genre(&mut self, track_id: &str, genres: &GenreSet) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE items SET genre = ?1 WHERE id = ?2",
            params![genres.join(), track_id],
        )?;
        if changed == 0 {
            return Err(StoreError::Db(rusqlite::Error::QueryReturnedNoRows));
        }
        self.dirty.insert(track_id.to_string());
        Ok(())
    }

    fn commit(&mut self) -> Result<CommitReport, StoreError> {
        let mut ids: Vec<String> = self.dirty.iter().cloned().collect();
        ids.sort();

        let mut report = CommitReport::default();
        for id in ids {
            let (path, genre) = match self.path_and_genre(&id) {
                Ok(pair) => pair,
                Err(e) => {
                    eprintln!("  write failed for track {id}: {e}");
                    report.failed += 1;
                    continue;
                }
            };
            match tags::write_genre_field(Path::new(&path), &genre) {
                Ok(()) => {
                    report.written += 1;
                    self.dirty.remove(&id);
                }
                Err(e) => {
                    eprintln!("  write failed for {path}: {e}");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    fn refresh_from_files(&mut self, track_ids: &[String]) -> Result<(), StoreError> {
        for id in track_ids {
            let (path, _) = match self.path_and_genre(id) {
                Ok(pair) => pair,
                Err(e) => {
                    eprintln!("  refresh failed for track {id}: {e}");
                    continue;
                }
            };
            match tags::read_genre_field(Path::new(&path)) {
                Ok(genre) => {
                    self.conn.execute(
                        "UPDATE items SET genre = ?1 WHERE id = ?2",
                        params![genre, id],
                    )?;
                    self.dirty.remove(id);
                }
                Err(e) => {
                    eprintln!("  refresh failed for {path}: {e}");
                }
            }
        }
        Ok(())
    }

    fn distinct_genres(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT genre FROM items WHERE TRIM(genre) <> ''")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut names = BTreeSet::new();
        for row in rows {
            for name in GenreSet::parse(&row?).iter() {
                names.insert(name.to_string());
            }
        }
        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_track(store: &mut SqliteLibrary, path: &str, artist: &str, title: &str, genre: &str) {
        store
            .upsert_file(
                path,
                &tags::FileTags {
                    artist: artist.to_string(),
                    album: String::new(),
                    title: title.to_string(),
                    genre: genre.to_string(),
                },
            )
            .expect("upsert");
    }

    #[test]
    fn query_missing_genre_selects_empty_fields_only() {
        let mut store = SqliteLibrary::open_in_memory();
        add_track(&mut store, "/m/a.flac", "A", "One", "");
        add_track(&mut store, "/m/b.flac", "B", "Two", "Techno");
        add_track(&mut store, "/m/c.flac", "C", "Three", "   ");

        let missing = store.query(GenreFilter::MissingGenre).expect("query");
        let titles: Vec<_> = missing.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Three"]);
    }

    #[test]
    fn query_comma_filter_selects_multi_genre_fields() {
        let mut store = SqliteLibrary::open_in_memory();
        add_track(&mut store, "/m/a.flac", "A", "One", "Dub, Techno");
        add_track(&mut store, "/m/b.flac", "B", "Two", "House");

        let comma = store.query(GenreFilter::CommaInGenre).expect("query");
        assert_eq!(comma.len(), 1);
        assert_eq!(comma[0].title, "One");
    }

    #[test]
    fn write_genre_updates_row_and_marks_dirty() {
        let mut store = SqliteLibrary::open_in_memory();
        add_track(&mut store, "/m/a.flac", "A", "One", "");
        let track = &store.query(GenreFilter::All).expect("query")[0];
        let id = track.id.clone();

        store
            .write_genre(&id, &GenreSet::parse("IDM, Electronic"))
            .expect("write");

        let after = &store.query(GenreFilter::All).expect("query")[0];
        assert_eq!(after.genre, "IDM, Electronic");
        assert_eq!(store.dirty_count(), 1);
    }

    #[test]
    fn write_genre_to_unknown_id_errors() {
        let mut store = SqliteLibrary::open_in_memory();
        let err = store.write_genre("999", &GenreSet::parse("Dub"));
        assert!(err.is_err());
        assert_eq!(store.dirty_count(), 0);
    }

    #[test]
    fn commit_counts_unflushable_files_without_aborting() {
        let mut store = SqliteLibrary::open_in_memory();
        add_track(&mut store, "/nonexistent/a.flac", "A", "One", "");
        add_track(&mut store, "/nonexistent/b.flac", "B", "Two", "");
        for track in store.query(GenreFilter::All).expect("query") {
            store
                .write_genre(&track.id, &GenreSet::parse("Dub"))
                .expect("write");
        }

        let report = store.commit().expect("commit");
        assert_eq!(report.written, 0);
        assert_eq!(report.failed, 2);
    }

    #[test]
    fn commit_with_no_dirty_tracks_is_a_no_op() {
        let mut store = SqliteLibrary::open_in_memory();
        add_track(&mut store, "/m/a.flac", "A", "One", "Techno");
        let report = store.commit().expect("commit");
        assert_eq!(report.written, 0);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn upsert_reports_inserted_then_updated() {
        let mut store = SqliteLibrary::open_in_memory();
        let fields = tags::FileTags {
            artist: "A".to_string(),
            album: "LP".to_string(),
            title: "One".to_string(),
            genre: "Dub".to_string(),
        };
        assert_eq!(
            store.upsert_file("/m/a.flac", &fields).expect("insert"),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            store.upsert_file("/m/a.flac", &fields).expect("update"),
            UpsertOutcome::Updated
        );
        assert_eq!(store.query(GenreFilter::All).expect("query").len(), 1);
    }

    #[test]
    fn distinct_genres_splits_fields_and_dedups() {
        let mut store = SqliteLibrary::open_in_memory();
        add_track(&mut store, "/m/a.flac", "A", "One", "Dub, Techno");
        add_track(&mut store, "/m/b.flac", "B", "Two", "Techno");
        add_track(&mut store, "/m/c.flac", "C", "Three", "Ambient");

        let genres = store.distinct_genres().expect("distinct");
        assert_eq!(genres, vec!["Ambient", "Dub", "Techno"]);
    }
}
