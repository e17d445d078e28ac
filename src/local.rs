//! Directory-backed factory snapshot.
//!
//! Lets the signing pipeline run on an air-gapped machine: metadata is
//! exported into a directory, Waves are written back into it, and the
//! operator carries the result to a connected host.
//!
//! ```text
//! <dir>/root.json                   signed root metadata
//! <dir>/targets-online-key.json     the service's online Targets key
//! <dir>/ci-targets.json             signed CI Targets, all versions
//! <dir>/prod/<tag>.json             production Targets per tag (optional)
//! <dir>/waves/<name>.json           Waves created here
//! <dir>/tuf-updates.json            staged root update state (optional)
//! ```
//!
//! Failures are reported with the status codes the factory service would
//! use, so callers classify them the same way.

use log::debug;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::api::{ApiError, FactoryApi, TufUpdates, TufUpdatesApi, TufUpdatesState, WaveCreate};
use crate::config::Settings;
use crate::fs_guard::{self, FileError};
use crate::metadata::{RootMeta, Signed, TargetFile, TargetsMeta, TufKey};

pub const ROOT_FILE: &str = "root.json";
pub const ONLINE_KEY_FILE: &str = "targets-online-key.json";
pub const CI_TARGETS_FILE: &str = "ci-targets.json";
pub const PROD_DIR: &str = "prod";
pub const WAVES_DIR: &str = "waves";
pub const TUF_UPDATES_FILE: &str = "tuf-updates.json";

fn status(code: u16, message: impl Into<String>) -> ApiError {
    ApiError::Status {
        code,
        message: message.into(),
    }
}

fn from_file_error(err: FileError) -> ApiError {
    if err.is_not_found() {
        status(404, err.to_string())
    } else {
        ApiError::Transport(err.to_string())
    }
}

/// Rejects names that would escape the snapshot directory.
fn plain_name<'a>(what: &str, name: &'a str) -> Result<&'a str, ApiError> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(status(400, format!("invalid {what}: {name:?}")));
    }
    Ok(name)
}

#[derive(Debug, Clone)]
pub struct LocalFactory {
    dir: PathBuf,
    max_bytes: u64,
}

impl LocalFactory {
    pub fn open(dir: &Path, settings: &Settings) -> Result<Self, ApiError> {
        if !dir.is_dir() {
            return Err(ApiError::Transport(format!(
                "factory directory not found: {}",
                dir.display()
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            max_bytes: settings.max_metadata_bytes,
        })
    }

    pub fn wave_path(&self, name: &str) -> PathBuf {
        self.dir.join(WAVES_DIR).join(format!("{name}.json"))
    }

    fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<T, ApiError> {
        fs_guard::read_json(path, self.max_bytes).map_err(from_file_error)
    }

    fn write_new(&self, path: &Path, bytes: &[u8]) -> Result<(), ApiError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ApiError::Transport(e.to_string()))?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(status(409, format!("{} already exists", path.display())))
            }
            Err(e) => return Err(ApiError::Transport(e.to_string())),
        };
        file.write_all(bytes)
            .map_err(|e| ApiError::Transport(e.to_string()))
    }

    fn write_updates(&self, updates: &TufUpdates) -> Result<(), ApiError> {
        let bytes =
            serde_json::to_vec_pretty(updates).map_err(|e| ApiError::Transport(e.to_string()))?;
        fs::write(self.dir.join(TUF_UPDATES_FILE), bytes)
            .map_err(|e| ApiError::Transport(e.to_string()))
    }
}

impl FactoryApi for LocalFactory {
    fn tuf_root(&self) -> Result<Signed<RootMeta>, ApiError> {
        self.read(&self.dir.join(ROOT_FILE))
    }

    fn targets_online_key(&self) -> Result<TufKey, ApiError> {
        self.read(&self.dir.join(ONLINE_KEY_FILE))
    }

    fn ci_targets(&self, version: u64) -> Result<BTreeMap<String, TargetFile>, ApiError> {
        let ci: Signed<TargetsMeta> = self.read(&self.dir.join(CI_TARGETS_FILE))?;
        let label = version.to_string();
        let selected: BTreeMap<_, _> = ci
            .signed
            .targets
            .into_iter()
            .filter(|(_, file)| file.custom_version() == Some(label.as_str()))
            .collect();
        debug!("{} CI target(s) for version {label}", selected.len());
        Ok(selected)
    }

    fn prod_targets(&self, tag: &str) -> Result<Option<Signed<TargetsMeta>>, ApiError> {
        let tag = plain_name("tag", tag)?;
        let path = self.dir.join(PROD_DIR).join(format!("{tag}.json"));
        match self.read(&path) {
            Ok(targets) => Ok(Some(targets)),
            Err(e) if e.status() == Some(404) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create_wave(&self, wave: &WaveCreate) -> Result<(), ApiError> {
        let name = plain_name("wave name", &wave.name)?;
        let bytes =
            serde_json::to_vec_pretty(wave).map_err(|e| ApiError::Transport(e.to_string()))?;
        self.write_new(&self.wave_path(name), &bytes)
    }
}

impl TufUpdatesApi for LocalFactory {
    fn tuf_updates(&self) -> Result<TufUpdates, ApiError> {
        match self.read(&self.dir.join(TUF_UPDATES_FILE)) {
            Err(e) if e.status() == Some(404) => Ok(TufUpdates {
                status: TufUpdatesState::None,
                txid: None,
            }),
            other => other,
        }
    }

    fn apply_tuf_updates(&self, txid: Option<&str>) -> Result<(), ApiError> {
        let mut updates = self.tuf_updates()?;
        match updates.status {
            TufUpdatesState::Staged => {}
            TufUpdatesState::Applying => {
                return Err(status(423, "TUF root updates are being applied"))
            }
            other => return Err(status(404, format!("no staged TUF root updates ({other})"))),
        }
        if let (Some(wanted), Some(staged)) = (txid, updates.txid.as_deref()) {
            if wanted != staged {
                return Err(status(
                    422,
                    format!("transaction {wanted} does not match staged transaction {staged}"),
                ));
            }
        }
        updates.status = TufUpdatesState::Applied;
        self.write_updates(&updates)
    }
}
