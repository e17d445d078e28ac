//! Contracts for the factory service this crate talks to.
//!
//! Transport is not implemented here; callers plug in whatever client they
//! have. [`crate::local::LocalFactory`] implements both traits on top of a
//! directory snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::metadata::{RootMeta, Signed, TargetFile, TargetsMeta, TufKey};

/// A failed collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The service answered with a non-success HTTP status.
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },

    /// No usable answer: connection failure, timeout, unreadable body.
    #[error("{0}")]
    Transport(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Transport(_) => None,
        }
    }
}

/// Wave creation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveCreate {
    pub name: String,
    pub version: String,
    pub tag: String,
    pub targets: Signed<TargetsMeta>,
}

/// Server-side state of a staged TUF root update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TufUpdatesState {
    None,
    Staged,
    Applying,
    Applied,
    Canceled,
}

impl fmt::Display for TufUpdatesState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Staged => "staged",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TufUpdates {
    pub status: TufUpdatesState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
}

/// Metadata reads and Wave submission for one factory.
pub trait FactoryApi {
    fn tuf_root(&self) -> Result<Signed<RootMeta>, ApiError>;

    /// Public half of the key the service signs Targets with.
    fn targets_online_key(&self) -> Result<TufKey, ApiError>;

    /// CI Targets built for `version`.
    fn ci_targets(&self, version: u64) -> Result<BTreeMap<String, TargetFile>, ApiError>;

    /// Current production Targets for `tag`, if any were ever created.
    fn prod_targets(&self, tag: &str) -> Result<Option<Signed<TargetsMeta>>, ApiError>;

    fn create_wave(&self, wave: &WaveCreate) -> Result<(), ApiError>;
}

/// Staged TUF root update transactions for one factory.
pub trait TufUpdatesApi {
    fn tuf_updates(&self) -> Result<TufUpdates, ApiError>;

    fn apply_tuf_updates(&self, txid: Option<&str>) -> Result<(), ApiError>;
}
