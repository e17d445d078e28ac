use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::fs_guard::{self, FileError};

/// Settings files are tiny; anything bigger is a mistake.
const MAX_SETTINGS_BYTES: u64 = 64 * 1024;

/// File name looked up inside a factory directory when no explicit
/// settings path is given.
pub const SETTINGS_FILE: &str = "tufwave.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Targets expiration used when the operator gives neither a day count
    /// nor an explicit timestamp.
    pub expires_days: u32,
    /// Archive directory holding private TUF keys.
    pub key_path_prefix: String,
    /// File suffix of private TUF key entries.
    pub key_file_suffix: String,
    pub max_archive_bytes: u64,
    pub max_metadata_bytes: u64,
    pub warn_missing_static_deltas: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            expires_days: 365,
            key_path_prefix: "tufrepo/keys/".to_string(),
            key_file_suffix: ".sec".to_string(),
            max_archive_bytes: 16 * 1024 * 1024,
            max_metadata_bytes: 64 * 1024 * 1024,
            warn_missing_static_deltas: true,
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self, FileError> {
        match path {
            Some(p) => fs_guard::read_json(p, MAX_SETTINGS_BYTES),
            None => Ok(Self::default()),
        }
    }

    /// Explicit path wins; otherwise `<factory_dir>/tufwave.json` if present.
    pub fn resolve(explicit: Option<&Path>, factory_dir: &Path) -> Result<Self, FileError> {
        let fallback = factory_dir.join(SETTINGS_FILE);
        match explicit {
            Some(p) => Self::load(Some(p)),
            None if fallback.exists() => Self::load(Some(&fallback)),
            None => Self::load(None),
        }
    }
}
