use crate::api::ApiError;
use crate::canonical::CanonicalError;
use crate::keystore::KeyStoreError;

/// Operator-facing classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Root, key material, or local settings are not usable as given.
    Configuration,
    /// The requested change violates a metadata invariant.
    Validation,
    /// A collaborator call failed.
    Server,
}

/// Errors raised while building, signing, or submitting a Wave.
#[derive(Debug, thiserror::Error)]
pub enum WaveError {
    #[error(
        "Root role is not configured to sign Targets offline.\n\
         Rotate the Targets role to an offline key first, then retry."
    )]
    OfflineSigningNotConfigured,

    #[error("Root metadata has no '{0}' role")]
    MissingRole(String),

    #[error("Root role '{role}' references key {key_id} which is missing from the root key map")]
    MissingRootKey { role: String, key_id: String },

    #[error(
        "None of the offline '{role}' keys [{}] were found in the offline credentials",
        candidates.join(", ")
    )]
    KeyNotFound {
        role: String,
        candidates: Vec<String>,
    },

    #[error("Failed to read offline credentials: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error(
        "Cannot create a Wave for version {requested}: production Targets for tag '{tag}' \
         are already at version {current}"
    )]
    VersionNotIncreasing {
        requested: u64,
        current: u64,
        tag: String,
    },

    #[error("Target {name} already exists in production Targets for tag {tag}")]
    TargetExists { name: String, tag: String },

    #[error("No targets found for version {0}")]
    NoTargetsForVersion(u64),

    #[error("Malformed CI Target custom field {name}: {reason}")]
    MalformedCustom { name: String, reason: String },

    #[error("Cannot prune current version {0}")]
    PruneCurrentVersion(String),

    #[error("Unable to prune the following versions: {}", .0.join(","))]
    PruneVersionsNotFound(Vec<String>),

    #[error("Failed to serialize Targets: {0}")]
    Canonical(#[from] CanonicalError),

    #[error("{context}: {source}")]
    Api {
        context: &'static str,
        #[source]
        source: ApiError,
    },
}

impl WaveError {
    pub(crate) fn api(context: &'static str) -> impl FnOnce(ApiError) -> Self {
        move |source| Self::Api { context, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OfflineSigningNotConfigured
            | Self::MissingRole(_)
            | Self::MissingRootKey { .. }
            | Self::KeyNotFound { .. }
            | Self::KeyStore(_) => ErrorKind::Configuration,
            Self::VersionNotIncreasing { .. }
            | Self::TargetExists { .. }
            | Self::NoTargetsForVersion(_)
            | Self::MalformedCustom { .. }
            | Self::PruneCurrentVersion(_)
            | Self::PruneVersionsNotFound(_)
            | Self::Canonical(_) => ErrorKind::Validation,
            Self::Api { .. } => ErrorKind::Server,
        }
    }
}
