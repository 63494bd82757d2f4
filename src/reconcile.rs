//! Idempotent batch operations over the track store.
//!
//! Fill resolves missing genres, Clean drops blacklisted entries, Remap
//! applies the rename table, Split normalizes comma-joined on-disk fields.
//! Each is safe to re-run to a fixed point: writes are issued only when a
//! track's genre set actually changes. A failure on one track is counted
//! and the batch moves on; only a failed store query aborts an operation.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::lastfm::TagService;
use crate::report::RunSummary;
use crate::resolver;
use crate::rules::{self, BlacklistRules, DefaultTransform, MappingTable};
use crate::store::{GenreFilter, StoreError, TrackStore};
use crate::tags::{self, SplitOutcome};

/// Quiet progress tick interval for unchanged tracks.
const PROGRESS_EVERY: usize = 500;

fn tick(idx: usize, total: usize) {
    if idx % PROGRESS_EVERY == 0 {
        eprintln!("[{idx}/{total}] Processed...");
    }
}

fn cancelled(cancel: &AtomicBool) -> bool {
    cancel.load(Ordering::Relaxed)
}

/// Fill: resolve genres for tracks whose genre field is empty.
pub async fn fill(
    store: &mut dyn TrackStore,
    service: &dyn TagService,
    rules: &BlacklistRules,
    mapping: &MappingTable,
    cancel: &AtomicBool,
) -> Result<RunSummary, StoreError> {
    let tracks = store.query(GenreFilter::MissingGenre)?;
    let total = tracks.len();
    let mut summary = RunSummary::default();

    if total == 0 {
        eprintln!("No tracks without genres found");
        return Ok(summary);
    }
    eprintln!("Found {total} tracks without genres");

    for (i, track) in tracks.iter().enumerate() {
        if cancelled(cancel) {
            summary.cancelled = true;
            break;
        }
        let idx = i + 1;
        summary.processed += 1;
        eprintln!("[{idx}/{total}] {} - {}", track.artist, track.title);

        match resolver::resolve(
            service,
            &track.artist,
            &track.title,
            &track.album,
            rules,
            mapping,
        )
        .await
        {
            Some((genres, tier)) => match store.write_genre(&track.id, &genres) {
                Ok(()) => {
                    summary.record_tier(tier);
                    eprintln!("  set ({tier}): {}", genres.join());
                }
                Err(e) => {
                    summary.write_failures += 1;
                    eprintln!("  failed to set genres: {e}");
                }
            },
            None => {
                summary.unresolved += 1;
                eprintln!("  no genres found");
            }
        }
    }

    Ok(summary)
}

/// Clean: drop blacklisted entries from non-empty genre fields. A track
/// reduced to nothing is written with an empty field, not left as-is.
pub fn clean(
    store: &mut dyn TrackStore,
    rules: &BlacklistRules,
    cancel: &AtomicBool,
) -> Result<RunSummary, StoreError> {
    let tracks = store.query(GenreFilter::HasGenre)?;
    let total = tracks.len();
    let mut summary = RunSummary::default();
    eprintln!("Processing {total} tracks...");

    for (i, track) in tracks.iter().enumerate() {
        if cancelled(cancel) {
            summary.cancelled = true;
            break;
        }
        let idx = i + 1;
        summary.processed += 1;

        let current = track.genres();
        let kept = rules::filter_rejected(&current, rules);
        if kept == current {
            tick(idx, total);
            continue;
        }

        let removed: Vec<&str> = current
            .iter()
            .filter(|g| rules::is_rejected(g, rules))
            .collect();
        eprintln!("[{idx}/{total}] {} - {}", track.artist, track.title);
        eprintln!("  Removed: {}", removed.join(", "));
        if kept.is_empty() {
            eprintln!("  All genres removed");
        } else {
            eprintln!("  Kept: {}", kept.join());
        }

        match store.write_genre(&track.id, &kept) {
            Ok(()) => summary.cleaned += 1,
            Err(e) => {
                summary.write_failures += 1;
                eprintln!("  failed to update genres: {e}");
            }
        }
    }

    Ok(summary)
}

/// Remap: apply the mapping table to non-empty genre fields. Unmapped
/// genres pass through verbatim, so a run over an already-remapped library
/// issues no writes.
pub fn remap(
    store: &mut dyn TrackStore,
    mapping: &MappingTable,
    cancel: &AtomicBool,
) -> Result<RunSummary, StoreError> {
    let tracks = store.query(GenreFilter::HasGenre)?;
    let total = tracks.len();
    let mut summary = RunSummary::default();
    eprintln!("Processing {total} tracks...");

    for (i, track) in tracks.iter().enumerate() {
        if cancelled(cancel) {
            summary.cancelled = true;
            break;
        }
        let idx = i + 1;
        summary.processed += 1;

        let current = track.genres();
        let mapped = rules::apply_mapping(&current, mapping, DefaultTransform::Verbatim);
        if mapped == current {
            tick(idx, total);
            continue;
        }

        eprintln!("[{idx}/{total}] {} - {}", track.artist, track.title);
        eprintln!("  {} -> {}", current.join(), mapped.join());

        match store.write_genre(&track.id, &mapped) {
            Ok(()) => summary.remapped += 1,
            Err(e) => {
                summary.write_failures += 1;
                eprintln!("  failed to update genres: {e}");
            }
        }
    }

    Ok(summary)
}

/// Split: rewrite comma-joined on-disk genre entries as repeated tag
/// entries, then refresh the database rows from the rewritten files.
pub fn split(store: &mut dyn TrackStore, cancel: &AtomicBool) -> Result<RunSummary, StoreError> {
    let tracks = store.query(GenreFilter::CommaInGenre)?;
    let total = tracks.len();
    let mut summary = RunSummary::default();

    if total == 0 {
        eprintln!("No files with comma-separated genres found");
        return Ok(summary);
    }
    eprintln!("Processing {total} files with comma-separated genres...");

    let mut changed_ids = Vec::new();
    for (i, track) in tracks.iter().enumerate() {
        if cancelled(cancel) {
            summary.cancelled = true;
            break;
        }
        let idx = i + 1;
        summary.processed += 1;

        let path = Path::new(&track.file_path);
        match tags::split_genre_field(path) {
            Ok(SplitOutcome::Converted(values)) => {
                summary.split += 1;
                changed_ids.push(track.id.clone());
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| track.file_path.clone());
                eprintln!("[{idx}/{total}] Converting: {name}");
                eprintln!("  {} -> {} separate tags", values.join(", "), values.len());
            }
            Ok(SplitOutcome::Unchanged) => tick(idx, total),
            Err(e) => {
                summary.write_failures += 1;
                eprintln!("[{idx}/{total}] FAIL {}: {e}", track.file_path);
            }
        }
    }

    store.refresh_from_files(&changed_ids)?;
    Ok(summary)
}
