//! Offline credentials archive.
//!
//! The archive is a gzip-compressed tar handed over by the operator. Private
//! TUF keys live under a fixed directory (`tufrepo/keys/` by default) as JSON
//! key files; everything else in the archive is ignored. The archive is read
//! once per command, held in memory, and never written back.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signer, SigningKey};
use flate2::read::GzDecoder;
use log::debug;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::fs_guard::{self, FileError};
use crate::metadata::{Signature, TufKey, ED25519};

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error(transparent)]
    File(#[from] FileError),

    #[error("{}: cannot unpack credentials archive: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{entry}: {reason}")]
    Format { entry: String, reason: String },

    #[error("no offline key found for any of [{}]", .0.join(", "))]
    KeyNotFound(Vec<String>),
}

fn format_err(entry: &str, reason: impl Into<String>) -> KeyStoreError {
    KeyStoreError::Format {
        entry: entry.to_string(),
        reason: reason.into(),
    }
}

/// A private ed25519 key able to sign TUF metadata.
pub struct OfflineSigner {
    key_id: String,
    public: TufKey,
    signing_key: SigningKey,
}

impl fmt::Debug for OfflineSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OfflineSigner({}, [REDACTED])", self.key_id)
    }
}

impl OfflineSigner {
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let public = TufKey::ed25519(signing_key.verifying_key().as_bytes());
        // Canonicalizing a two-field object of strings cannot fail.
        let key_id = public.key_id().unwrap_or_default();
        Self {
            key_id,
            public,
            signing_key,
        }
    }

    /// Parses one JSON key file. Returns `Ok(None)` for key types this crate
    /// cannot sign with.
    ///
    /// The key ID is derived from the file's own keytype spelling.
    pub fn from_key_file(entry: &str, bytes: &[u8]) -> Result<Option<Self>, KeyStoreError> {
        let key: TufKey = serde_json::from_slice(bytes)
            .map_err(|e| format_err(entry, format!("invalid key file: {e}")))?;
        if !key.is_ed25519() {
            debug!("Skipping {entry}: unsupported key type {}", key.keytype);
            return Ok(None);
        }
        let private = key
            .keyval
            .private
            .as_deref()
            .ok_or_else(|| format_err(entry, "key file has no private key"))?;
        let private = Zeroizing::new(
            STANDARD
                .decode(private)
                .map_err(|e| format_err(entry, format!("private key is not base64: {e}")))?,
        );
        let seed: [u8; 32] = match private.len() {
            32 | 64 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&private[..32]);
                seed
            }
            n => {
                return Err(format_err(
                    entry,
                    format!("ed25519 private key must be 32 or 64 bytes, got {n}"),
                ))
            }
        };
        let signing_key = SigningKey::from_bytes(&seed);
        let derived = signing_key.verifying_key();
        let stored_public = STANDARD
            .decode(&key.keyval.public)
            .map_err(|e| format_err(entry, format!("public key is not base64: {e}")))?;
        let trailing_matches = private.len() == 32 || private[32..] == derived.as_bytes()[..];
        if stored_public != derived.as_bytes() || !trailing_matches {
            return Err(format_err(
                entry,
                "public key does not match the private key",
            ));
        }
        let public = key.public_only();
        let key_id = public
            .key_id()
            .map_err(|e| format_err(entry, format!("cannot derive key ID: {e}")))?;
        Ok(Some(Self {
            key_id,
            public,
            signing_key,
        }))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn public_key(&self) -> &TufKey {
        &self.public
    }

    /// Signs `message` (canonical metadata bytes) under this key's own ID.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.sign_as(&self.key_id, message)
    }

    /// Signs `message`, labelling the signature with `key_id`.
    pub fn sign_as(&self, key_id: &str, message: &[u8]) -> Signature {
        Signature {
            keyid: key_id.to_string(),
            method: ED25519.to_string(),
            sig: STANDARD.encode(self.signing_key.sign(message).to_bytes()),
        }
    }
}

/// A held signer matched to a key ID listed in root metadata.
#[derive(Debug, Clone, Copy)]
pub struct KeyMatch<'a> {
    pub key_id: &'a str,
    pub signer: &'a OfflineSigner,
}

impl KeyMatch<'_> {
    /// Signs under the root's key ID, which verifiers look up.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signer.sign_as(self.key_id, message)
    }
}

/// In-memory index of offline signers by key ID.
#[derive(Debug, Default)]
pub struct OfflineKeyStore {
    signers: BTreeMap<String, OfflineSigner>,
}

impl OfflineKeyStore {
    /// Reads and unpacks the archive at `path`.
    pub fn load(path: &Path, settings: &Settings) -> Result<Self, KeyStoreError> {
        let bytes = fs_guard::read_bounded(path, settings.max_archive_bytes)?;
        let store = Self::from_archive(&bytes[..], settings).map_err(|e| match e {
            KeyStoreError::Decode { source, .. } => KeyStoreError::Decode {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        debug!(
            "Loaded {} offline key(s) from {}",
            store.len(),
            path.display()
        );
        Ok(store)
    }

    /// Unpacks a gzip-compressed tar stream.
    pub fn from_archive<R: Read>(reader: R, settings: &Settings) -> Result<Self, KeyStoreError> {
        let decode = |source| KeyStoreError::Decode {
            path: PathBuf::from("<archive>"),
            source,
        };
        let mut archive = tar::Archive::new(GzDecoder::new(reader));
        let mut store = Self::default();
        let mut unpacked: u64 = 0;

        for entry in archive.entries().map_err(decode)? {
            let entry = entry.map_err(decode)?;
            let name = entry.path().map_err(decode)?.to_string_lossy().into_owned();
            if !entry.header().entry_type().is_file()
                || !name.starts_with(&settings.key_path_prefix)
                || !name.ends_with(&settings.key_file_suffix)
            {
                continue;
            }
            unpacked = unpacked.saturating_add(entry.size());
            if unpacked > settings.max_archive_bytes {
                return Err(format_err(&name, "credentials archive unpacks too large"));
            }

            let mut contents = Zeroizing::new(Vec::new());
            entry
                .take(settings.max_archive_bytes)
                .read_to_end(&mut contents)
                .map_err(decode)?;
            if let Some(signer) = OfflineSigner::from_key_file(&name, &contents)? {
                store.insert(signer);
            }
        }
        Ok(store)
    }

    pub fn from_signers(signers: impl IntoIterator<Item = OfflineSigner>) -> Self {
        let mut store = Self::default();
        for signer in signers {
            store.insert(signer);
        }
        store
    }

    fn insert(&mut self, signer: OfflineSigner) {
        if self.find_by_public(&signer.public).is_some() {
            debug!("Ignoring duplicate offline key {}", signer.key_id);
            return;
        }
        self.signers.insert(signer.key_id.clone(), signer);
    }

    pub fn get(&self, key_id: &str) -> Option<&OfflineSigner> {
        self.signers.get(key_id)
    }

    /// The signer holding the private half of `public`, compared by decoded
    /// key bytes.
    pub fn find_by_public(&self, public: &TufKey) -> Option<&OfflineSigner> {
        self.signers.values().find(|s| s.public.same_public(public))
    }

    fn match_candidate<'a>(&'a self, key_id: &'a str, public: &TufKey) -> Option<KeyMatch<'a>> {
        self.find_by_public(public)
            .map(|signer| KeyMatch { key_id, signer })
    }

    /// First held signer among `candidates` (root key ID and public key).
    pub fn find_signer<'a>(
        &'a self,
        candidates: &[(&'a str, &TufKey)],
    ) -> Result<KeyMatch<'a>, KeyStoreError> {
        candidates
            .iter()
            .find_map(|&(id, key)| self.match_candidate(id, key))
            .ok_or_else(|| {
                let ids = candidates.iter().map(|(id, _)| id.to_string()).collect();
                KeyStoreError::KeyNotFound(ids)
            })
    }

    /// Every held signer among `candidates`, in candidate order.
    pub fn find_signers<'a>(&'a self, candidates: &[(&'a str, &TufKey)]) -> Vec<KeyMatch<'a>> {
        candidates
            .iter()
            .filter_map(|&(id, key)| self.match_candidate(id, key))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }
}
