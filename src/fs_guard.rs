use serde::de::DeserializeOwned;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Failures reading an operator-supplied file.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("Refusing to read symlink: {}", .0.display())]
    Symlink(PathBuf),

    #[error("File too large: {} ({len} bytes, max {max} bytes)", path.display())]
    TooLarge { path: PathBuf, len: u64, max: u64 },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: invalid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl FileError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Reads a file after checking it is not a symlink and holds at most `max_bytes`.
///
/// There is a narrow window between the metadata check and the read; the
/// check catches accidental links and oversize inputs, not a racing attacker.
pub fn read_bounded(path: &Path, max_bytes: u64) -> Result<Vec<u8>, FileError> {
    let io_err = |source| FileError::Io {
        path: path.to_path_buf(),
        source,
    };
    let meta = fs::symlink_metadata(path).map_err(io_err)?;
    if meta.file_type().is_symlink() {
        return Err(FileError::Symlink(path.to_path_buf()));
    }
    if meta.len() > max_bytes {
        return Err(FileError::TooLarge {
            path: path.to_path_buf(),
            len: meta.len(),
            max: max_bytes,
        });
    }
    fs::read(path).map_err(io_err)
}

/// [`read_bounded`] followed by JSON decoding.
pub fn read_json<T: DeserializeOwned>(path: &Path, max_bytes: u64) -> Result<T, FileError> {
    let bytes = read_bounded(path, max_bytes)?;
    serde_json::from_slice(&bytes).map_err(|source| FileError::Json {
        path: path.to_path_buf(),
        source,
    })
}
