//! # tufwave -- offline TUF signing for production Waves
//!
//! Promotes a CI build version into a factory's production Targets metadata,
//! signs the result with the operator's offline Targets keys, and submits it
//! as a Wave. Also applies staged TUF root rotations with failure handling
//! that never tells the operator to cancel a possibly half-applied update.
//!
//! ## Security Properties
//!
//! - **`#![forbid(unsafe_code)]`**: No `unsafe` blocks anywhere in the crate.
//! - **Online key exclusion**: The service's online Targets key is matched by
//!   public-key value and never used to produce an offline signature.
//! - **Redacted key material**: Private keys are zeroized on drop and never
//!   appear in `Debug` output or logs.
//! - **Defensive input handling**: Operator-supplied files are symlink-checked
//!   and size-bounded via [`fs_guard::read_bounded`].
//! - **Canonical signing bytes**: Every signature covers the canonical JSON
//!   encoding produced by [`canonical`], byte-compatible with device-side
//!   verifiers.
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`canonical`] | Canonical JSON encoding |
//! | [`metadata`] | TUF Root/Targets model, key IDs, threshold checks |
//! | [`keystore`] | Offline credentials archive |
//! | [`signer`] | Offline signer selection and signing |
//! | [`wave`] | Merge, prune, sign, submit |
//! | [`tuf_updates`] | Staged root update apply protocol |
//! | [`api`] | Factory service contracts |
//! | [`local`] | Directory-backed factory snapshot |
//! | [`config`] | Settings file and defaults |
//! | [`fs_guard`] | Symlink-safe, size-bounded file reads |
//! | [`error`] | Wave error taxonomy |

#![forbid(unsafe_code)]

/// Canonical JSON: sorted keys, no insignificant whitespace. The only byte
/// form that is ever signed.
pub mod canonical;

/// TUF metadata types shared by every other module.
pub mod metadata;

/// Loads offline ed25519 signing keys from the credentials archive.
pub mod keystore;

/// Chooses which offline keys sign a role's metadata.
pub mod signer;

/// Wave creation pipeline.
pub mod wave;

/// Applies staged TUF root updates and classifies failures.
pub mod tuf_updates;

/// Collaborator traits the pipeline talks to.
pub mod api;

/// Factory snapshot stored in a local directory.
pub mod local;

/// Settings model: loads `tufwave.json` and provides defaults.
pub mod config;

/// Symlink-safe, size-bounded file reads.
pub mod fs_guard;

pub mod error;

pub use error::{ErrorKind, WaveError};
