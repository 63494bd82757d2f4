//! Blacklist and mapping configuration files.
//!
//! Two independently-edited JSON files under the user config directory.
//! A missing file is not an error: empty rules are substituted and an empty
//! file is written so the user has something to edit. Both are re-read at
//! the start of every operation; nothing is cached across runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::rules::{BlacklistRules, MappingTable};

pub const BLACKLIST_FILE: &str = "genre_blacklist.json";
pub const MAPPING_FILE: &str = "genre_mapping.json";

pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("genrebridge")
}

/// Blacklist file shapes. The explicit object form takes precedence; a bare
/// array of terms is the legacy layout and reads as contains-terms only.
#[derive(Deserialize)]
#[serde(untagged)]
enum BlacklistFile {
    Split {
        #[serde(default)]
        contains: Vec<String>,
        #[serde(default)]
        exact: Vec<String>,
    },
    Legacy(Vec<String>),
}

pub fn load_blacklist(path: &Path) -> Result<BlacklistRules, String> {
    let Some(raw) = read_or_create(path, "{\n  \"contains\": [],\n  \"exact\": []\n}\n")? else {
        return Ok(BlacklistRules::default());
    };

    let file: BlacklistFile = serde_json::from_str(&raw)
        .map_err(|e| format!("Malformed blacklist file {}: {e}", path.display()))?;

    let (contains, exact) = match file {
        BlacklistFile::Split { contains, exact } => (contains, exact),
        BlacklistFile::Legacy(terms) => (terms, Vec::new()),
    };

    Ok(BlacklistRules {
        exact: exact.into_iter().map(|t| t.to_lowercase()).collect(),
        contains: contains.into_iter().map(|t| t.to_lowercase()).collect(),
    })
}

pub fn load_mapping(path: &Path) -> Result<MappingTable, String> {
    let Some(raw) = read_or_create(path, "{}\n")? else {
        return Ok(MappingTable::default());
    };

    let entries: HashMap<String, String> = serde_json::from_str(&raw)
        .map_err(|e| format!("Malformed mapping file {}: {e}", path.display()))?;

    Ok(MappingTable::new(entries))
}

/// Read the file, or materialize `default_contents` and return `None` when
/// it does not exist yet.
fn read_or_create(path: &Path, default_contents: &str) -> Result<Option<String>, String> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Cannot create {}: {e}", parent.display()))?;
        }
        std::fs::write(path, default_contents)
            .map_err(|e| format!("Cannot write {}: {e}", path.display()))?;
        eprintln!("Created empty config file: {}", path.display());
        return Ok(None);
    }

    std::fs::read_to_string(path)
        .map(Some)
        .map_err(|e| format!("Cannot read {}: {e}", path.display()))
}
