//! Typed TUF metadata: root roles, keys, Targets documents, signatures.
//!
//! Only the fields the signing pipeline reads are typed. Target `custom`
//! annotations stay a dynamically-typed JSON value so unknown fields survive
//! tag rewriting and pruning untouched.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::VerifyingKey;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::canonical::{to_canonical_vec, CanonicalError};
use crate::error::WaveError;

const SECONDS_PER_DAY: i64 = 86_400;

/// `_type` of a Targets document.
pub const TARGETS_TYPE: &str = "Targets";
/// The only key type this crate signs and verifies with.
pub const ED25519: &str = "ed25519";

/// Custom annotation holding the target's tags.
pub const CUSTOM_TAGS: &str = "tags";
/// Custom annotation holding the CI build version label.
pub const CUSTOM_VERSION: &str = "version";
/// Custom annotation holding static delta statistics.
pub const CUSTOM_DELTA_STATS: &str = "delta-stats";

/// Top-level TUF roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Root,
    Targets,
    Snapshot,
    Timestamp,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Targets => "targets",
            Self::Snapshot => "snapshot",
            Self::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata expiration: always UTC, always whole seconds.
///
/// Device clients reject RFC 3339 timestamps carrying fractional seconds, so
/// every constructor truncates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Expires(OffsetDateTime);

#[derive(Debug, thiserror::Error)]
pub enum ExpiresError {
    #[error("invalid RFC 3339 timestamp: {0}")]
    Parse(#[from] time::error::Parse),

    #[error("expiration is outside the supported range (years 0000-9999 UTC)")]
    OutOfRange,
}

impl Expires {
    pub fn from_datetime(at: OffsetDateTime) -> Result<Self, ExpiresError> {
        Self::from_unix_timestamp(at.unix_timestamp())
    }

    fn from_unix_timestamp(secs: i64) -> Result<Self, ExpiresError> {
        OffsetDateTime::from_unix_timestamp(secs)
            .map(Self)
            .map_err(|_| ExpiresError::OutOfRange)
    }

    /// Expiration `days` from now.
    pub fn in_days(days: u32) -> Result<Self, ExpiresError> {
        let secs = OffsetDateTime::now_utc()
            .unix_timestamp()
            .checked_add(i64::from(days) * SECONDS_PER_DAY)
            .ok_or(ExpiresError::OutOfRange)?;
        Self::from_unix_timestamp(secs)
    }

    pub fn parse_rfc3339(s: &str) -> Result<Self, ExpiresError> {
        Self::from_datetime(OffsetDateTime::parse(s, &Rfc3339)?)
    }

    pub fn to_rfc3339(&self) -> Result<String, time::error::Format> {
        self.0.format(&Rfc3339)
    }
}

impl Serialize for Expires {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let s = self.to_rfc3339().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&s)
    }
}

impl<'de> Deserialize<'de> for Expires {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_rfc3339(&s).map_err(de::Error::custom)
    }
}

/// Key material as it appears in root metadata and key files.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub public: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<String>,
}

/// A TUF key entry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TufKey {
    pub keytype: String,
    pub keyval: KeyValue,
}

impl fmt::Debug for TufKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TufKey")
            .field("keytype", &self.keytype)
            .field("public", &self.keyval.public)
            .field(
                "private",
                &self.keyval.private.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl TufKey {
    pub fn ed25519(public: &[u8]) -> Self {
        Self {
            keytype: ED25519.to_string(),
            keyval: KeyValue {
                public: STANDARD.encode(public),
                private: None,
            },
        }
    }

    /// Content-derived key ID: hex SHA-256 over the canonical public-only form.
    pub fn key_id(&self) -> Result<String, CanonicalError> {
        let public_only = json!({
            "keytype": self.keytype,
            "keyval": { "private": Value::Null, "public": self.keyval.public },
        });
        let bytes = to_canonical_vec(&public_only)?;
        Ok(hex::encode(Sha256::digest(bytes)))
    }

    /// The same key with private material stripped.
    pub fn public_only(&self) -> Self {
        Self {
            keytype: self.keytype.clone(),
            keyval: KeyValue {
                public: self.keyval.public.clone(),
                private: None,
            },
        }
    }

    /// Key types compare case-insensitively.
    pub fn is_ed25519(&self) -> bool {
        self.keytype.eq_ignore_ascii_case(ED25519)
    }

    /// The decoded ed25519 public key, if this is a well-formed one.
    pub fn ed25519_public(&self) -> Option<[u8; 32]> {
        if !self.is_ed25519() {
            return None;
        }
        let public = STANDARD.decode(&self.keyval.public).ok()?;
        <[u8; 32]>::try_from(public.as_slice()).ok()
    }

    /// Compares decoded public key values, ignoring encoding and keytype case.
    pub fn same_public(&self, other: &TufKey) -> bool {
        match (self.ed25519_public(), other.ed25519_public()) {
            (Some(a), Some(b)) => a == b,
            _ => self.keyval.public == other.keyval.public,
        }
    }

    /// Verifies an ed25519 signature; any decoding problem counts as invalid.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        if !signature.method.eq_ignore_ascii_case(ED25519) {
            return false;
        }
        let Some(public) = self.ed25519_public() else {
            return false;
        };
        let Ok(vk) = VerifyingKey::from_bytes(&public) else {
            return false;
        };
        let Ok(sig) = STANDARD.decode(&signature.sig) else {
            return false;
        };
        let Ok(sig) = ed25519_dalek::Signature::try_from(sig.as_slice()) else {
            return false;
        };
        vk.verify_strict(message, &sig).is_ok()
    }
}

/// Key IDs and signature threshold for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: u32,
}

/// Signed portion of root metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootMeta {
    #[serde(rename = "_type")]
    pub kind: String,
    pub expires: Expires,
    pub version: u64,
    pub keys: BTreeMap<String, TufKey>,
    pub roles: BTreeMap<String, RoleKeys>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RootMeta {
    pub fn role(&self, role: Role) -> Option<&RoleKeys> {
        self.roles.get(role.as_str())
    }

    /// Returns the role definition after checking every key ID it references
    /// is present in the root key map.
    pub fn checked_role(&self, role: Role) -> Result<&RoleKeys, WaveError> {
        let keys = self
            .role(role)
            .ok_or_else(|| WaveError::MissingRole(role.to_string()))?;
        if let Some(missing) = keys.keyids.iter().find(|id| !self.keys.contains_key(*id)) {
            return Err(WaveError::MissingRootKey {
                role: role.to_string(),
                key_id: missing.clone(),
            });
        }
        Ok(keys)
    }
}

/// One artifact entry in a Targets document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetFile {
    pub hashes: BTreeMap<String, String>,
    pub length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

impl TargetFile {
    fn custom_field(&self, field: &str) -> Option<&Value> {
        self.custom.as_ref()?.as_object()?.get(field)
    }

    /// The CI version label, if annotated.
    pub fn custom_version(&self) -> Option<&str> {
        self.custom_field(CUSTOM_VERSION)?.as_str()
    }

    /// Tags annotated on the target; non-string entries are ignored.
    pub fn custom_tags(&self) -> Vec<&str> {
        self.custom_field(CUSTOM_TAGS)
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.custom_tags().contains(&tag)
    }

    pub fn has_delta_stats(&self) -> bool {
        self.custom_field(CUSTOM_DELTA_STATS)
            .is_some_and(|stats| !stats.is_null())
    }

    /// Replaces the `tags` annotation with exactly `[tag]`, leaving every
    /// other custom field as it was.
    pub fn replace_tags(&mut self, tag: &str) -> Result<(), String> {
        let custom = self
            .custom
            .as_mut()
            .ok_or_else(|| "no custom annotations".to_string())?;
        let object = custom
            .as_object_mut()
            .ok_or_else(|| "custom annotations are not a JSON object".to_string())?;
        object.insert(CUSTOM_TAGS.to_string(), json!([tag]));
        Ok(())
    }
}

/// Signed portion of a Targets document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetsMeta {
    #[serde(rename = "_type")]
    pub kind: String,
    pub expires: Expires,
    pub version: u64,
    pub targets: BTreeMap<String, TargetFile>,
}

impl TargetsMeta {
    pub fn new(version: u64, expires: Expires) -> Self {
        Self {
            kind: TARGETS_TYPE.to_string(),
            expires,
            version,
            targets: BTreeMap::new(),
        }
    }
}

/// A signature over the canonical bytes of a `signed` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub keyid: String,
    pub method: String,
    pub sig: String,
}

/// The `{signatures, signed}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signed<T> {
    pub signatures: Vec<Signature>,
    pub signed: T,
}

impl<T: Serialize> Signed<T> {
    pub fn canonical_signed(&self) -> Result<Vec<u8>, CanonicalError> {
        to_canonical_vec(&self.signed)
    }

    /// Counts distinct keys of `role` with a valid signature over `signed`.
    pub fn count_valid_signatures(
        &self,
        root: &RootMeta,
        role: Role,
    ) -> Result<usize, WaveError> {
        let keys = root.checked_role(role)?;
        let message = self.canonical_signed()?;
        let mut good = BTreeSet::new();
        for sig in &self.signatures {
            if !keys.keyids.contains(&sig.keyid) || good.contains(sig.keyid.as_str()) {
                continue;
            }
            let Some(key) = root.keys.get(&sig.keyid) else {
                continue;
            };
            if key.verify(&message, sig) {
                good.insert(sig.keyid.as_str());
            }
        }
        Ok(good.len())
    }

    /// True when valid signatures from `role` keys reach its threshold.
    pub fn meets_threshold(&self, root: &RootMeta, role: Role) -> Result<bool, WaveError> {
        let threshold = root.checked_role(role)?.threshold.max(1);
        let valid = self.count_valid_signatures(root, role)?;
        Ok(u32::try_from(valid).unwrap_or(u32::MAX) >= threshold)
    }
}
