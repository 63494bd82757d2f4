use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand, ValueEnum};

use crate::config;
use crate::lastfm::LastFm;
use crate::reconcile;
use crate::report::{self, RunSummary};
use crate::rules::{BlacklistRules, MappingTable};
use crate::store::{self, SqliteLibrary, TrackStore, UpsertOutcome};
use crate::tags;

pub const LIBRARY_ENV: &str = "GENREBRIDGE_LIBRARY";

#[derive(Parser)]
#[command(
    name = "genrebridge",
    about = "Resolve, clean, and normalize music-library genre tags via Last.fm"
)]
struct Cli {
    /// Library database path (defaults to $GENREBRIDGE_LIBRARY, then the
    /// user data directory)
    #[arg(long, global = true)]
    library: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a music directory into the library database
    Scan {
        /// Directory to scan recursively
        path: PathBuf,
    },
    /// Resolve genres for tracks without any (track -> album -> artist)
    Fill,
    /// Remove blacklisted genres from the library
    Clean,
    /// Apply the genre mapping table to the library
    Remap,
    /// Rewrite comma-joined on-disk genre fields as repeated tag entries
    Split,
    /// Run fill -> remap -> split in sequence with per-step confirmation
    Batch {
        /// Skip confirmation prompts
        #[arg(long)]
        yes: bool,
    },
    /// List genres present in the library
    Genres {
        /// all: every distinct genre; new: genres missing from the mapping file
        #[arg(value_enum)]
        which: GenreListing,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GenreListing {
    All,
    New,
}

pub async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let cancel = install_interrupt_handler();
    let db_path = resolve_library_path(cli.library);

    match cli.command {
        Command::Scan { path } => scan(&db_path, &path),
        Command::Fill => {
            let mut store = open_store(&db_path)?;
            run_fill(&mut store, &cancel).await
        }
        Command::Clean => {
            let mut store = open_store(&db_path)?;
            run_clean(&mut store, &cancel)
        }
        Command::Remap => {
            let mut store = open_store(&db_path)?;
            run_remap(&mut store, &cancel)
        }
        Command::Split => {
            let mut store = open_store(&db_path)?;
            run_split(&mut store, &cancel)
        }
        Command::Batch { yes } => batch(&db_path, &cancel, yes).await,
        Command::Genres { which } => genres(&db_path, which),
    }
}

fn resolve_library_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var_os(LIBRARY_ENV).map(PathBuf::from))
        .unwrap_or_else(store::default_path)
}

fn open_store(path: &Path) -> Result<SqliteLibrary, Box<dyn Error>> {
    SqliteLibrary::open(path)
        .map_err(|e| format!("Cannot open library database {}: {e}", path.display()).into())
}

fn install_interrupt_handler() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, finishing the current track...");
        handler_flag.store(true, Ordering::Relaxed);
    }) {
        eprintln!("Warning: cannot install interrupt handler: {e}");
    }
    flag
}

// Rule tables are re-read from disk at the start of every operation so
// edits between batch steps take effect.

fn load_blacklist() -> Result<BlacklistRules, Box<dyn Error>> {
    let dir = config::default_config_dir();
    Ok(config::load_blacklist(&dir.join(config::BLACKLIST_FILE))?)
}

fn load_mapping() -> Result<MappingTable, Box<dyn Error>> {
    let dir = config::default_config_dir();
    Ok(config::load_mapping(&dir.join(config::MAPPING_FILE))?)
}

/// Flush store changes to files and print the final tally.
fn finish(store: &mut dyn TrackStore, summary: &RunSummary) -> Result<(), Box<dyn Error>> {
    if summary.changed() > 0 {
        eprintln!("\nWriting changes to files...");
        let commit = store.commit()?;
        if commit.failed > 0 {
            eprintln!("{} files could not be written", commit.failed);
        }
    }
    eprintln!("Done: {summary}");
    Ok(())
}

async fn run_fill(store: &mut SqliteLibrary, cancel: &AtomicBool) -> Result<(), Box<dyn Error>> {
    let service = LastFm::from_env()?;
    let rules = load_blacklist()?;
    let mapping = load_mapping()?;
    eprintln!("Searching for tracks without genres...");
    let summary = reconcile::fill(store, &service, &rules, &mapping, cancel).await?;
    finish(store, &summary)
}

fn run_clean(store: &mut SqliteLibrary, cancel: &AtomicBool) -> Result<(), Box<dyn Error>> {
    let rules = load_blacklist()?;
    if rules.is_empty() {
        eprintln!("No blacklist entries found (digit rule still applies)");
    }
    let summary = reconcile::clean(store, &rules, cancel)?;
    finish(store, &summary)
}

fn run_remap(store: &mut SqliteLibrary, cancel: &AtomicBool) -> Result<(), Box<dyn Error>> {
    let mapping = load_mapping()?;
    if mapping.is_empty() {
        eprintln!("No mappings found in file");
        return Ok(());
    }
    let summary = reconcile::remap(store, &mapping, cancel)?;
    finish(store, &summary)
}

fn run_split(store: &mut SqliteLibrary, cancel: &AtomicBool) -> Result<(), Box<dyn Error>> {
    let summary = reconcile::split(store, cancel)?;
    eprintln!("Done: {summary}");
    Ok(())
}

const BATCH_STEPS: &[&str] = &["fill", "remap", "split"];

async fn batch(db_path: &Path, cancel: &AtomicBool, yes: bool) -> Result<(), Box<dyn Error>> {
    eprintln!("Batch genre processing");
    eprintln!("Will run in sequence: {}", BATCH_STEPS.join(", "));

    let mut store = open_store(db_path)?;
    let mut completed = 0usize;

    for (i, &step) in BATCH_STEPS.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            eprintln!("Cancelled before step {step}");
            break;
        }

        eprintln!("\nStep {}/{}: {step}", i + 1, BATCH_STEPS.len());
        if !yes && !confirm(&format!("Run {step}? (y/N): "))? {
            eprintln!("Skipped {step}");
            continue;
        }

        let result = match step {
            "fill" => run_fill(&mut store, cancel).await,
            "remap" => run_remap(&mut store, cancel),
            "split" => run_split(&mut store, cancel),
            _ => unreachable!("unknown batch step {step}"),
        };

        match result {
            Ok(()) => {
                completed += 1;
                eprintln!("Step {step} completed");
            }
            Err(e) => {
                eprintln!("Error in step {step}: {e}");
                if !yes && !confirm("Continue with next step? (y/N): ")? {
                    break;
                }
            }
        }
    }

    eprintln!("\nSummary: {completed}/{} steps completed", BATCH_STEPS.len());
    Ok(())
}

fn genres(db_path: &Path, which: GenreListing) -> Result<(), Box<dyn Error>> {
    let store = open_store(db_path)?;
    eprintln!("Collecting all genres from the library...");
    let all = store.distinct_genres()?;

    if all.is_empty() {
        eprintln!("No genres found in the library");
        return Ok(());
    }

    match which {
        GenreListing::All => {
            println!("All genres in the library ({}):", all.len());
            for (i, genre) in all.iter().enumerate() {
                println!("{:3}. {genre}", i + 1);
            }
        }
        GenreListing::New => {
            let mapping = load_mapping()?;
            let unmapped = report::unmapped_genres(&all, &mapping);
            if unmapped.is_empty() {
                println!("All genres are already in the mapping file");
            } else {
                println!("Genres not in the mapping file ({}):", unmapped.len());
                for (i, genre) in unmapped.iter().enumerate() {
                    println!("{:3}. {genre}", i + 1);
                }
            }
        }
    }

    println!("\nTotal: {} distinct genres in the library", all.len());
    Ok(())
}

fn scan(db_path: &Path, root: &Path) -> Result<(), Box<dyn Error>> {
    if !root.is_dir() {
        return Err(format!("Not a directory: {}", root.display()).into());
    }
    let mut store = open_store(db_path)?;

    let mut seen = 0usize;
    let mut added = 0usize;
    let mut updated = 0usize;
    let mut failed = 0usize;
    let mut dirs = vec![root.to_path_buf()];

    while let Some(dir) = dirs.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) => {
                eprintln!("Cannot read {}: {e}", dir.display());
                continue;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    eprintln!("Dir entry error in {}: {e}", dir.display());
                    continue;
                }
            };
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
                continue;
            }
            if !tags::is_audio_file(&path) {
                continue;
            }

            seen += 1;
            let outcome = tags::read_file_tags(&path).map_err(StoreScanError::from).and_then(|fields| {
                store
                    .upsert_file(&path.to_string_lossy(), &fields)
                    .map_err(StoreScanError::from)
            });
            match outcome {
                Ok(UpsertOutcome::Inserted) => added += 1,
                Ok(UpsertOutcome::Updated) => updated += 1,
                Err(e) => {
                    failed += 1;
                    eprintln!("FAIL {}: {e}", path.display());
                }
            }
            if seen % 500 == 0 {
                eprintln!("[{seen}] Scanned...");
            }
        }
    }

    eprintln!("Done: {seen} audio files, {added} added, {updated} updated, {failed} failed");
    Ok(())
}

/// Unifies tag-read and store errors in the scan loop.
#[derive(Debug, thiserror::Error)]
enum StoreScanError {
    #[error("{0}")]
    Tag(#[from] tags::TagError),
    #[error("{0}")]
    Store(#[from] store::StoreError),
}

fn confirm(prompt: &str) -> Result<bool, Box<dyn Error>> {
    eprint!("{prompt}");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(is_yes(&line))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
