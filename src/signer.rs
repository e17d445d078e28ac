//! Offline signer selection.
//!
//! The service holds one "online" key per role and co-signs routine metadata
//! with it. Production Targets must additionally carry signatures from the
//! operator's offline keys, so signing here means: take the role's key IDs,
//! drop the one whose public key is the online key, and sign with every
//! remaining key the operator actually has.

use log::{debug, info};

use crate::canonical::to_canonical_vec;
use crate::error::WaveError;
use crate::keystore::{KeyMatch, OfflineKeyStore};
use crate::metadata::{Role, RootMeta, Signature, Signed, TargetsMeta, TufKey};

/// Role key IDs minus the online key.
///
/// The online key is matched by public key value, not ID, so a root listing
/// the same key under two IDs still excludes both.
pub fn offline_key_ids(
    root: &RootMeta,
    role: Role,
    online: &TufKey,
) -> Result<Vec<String>, WaveError> {
    let keys = root.checked_role(role)?;
    let ids: Vec<String> = keys
        .keyids
        .iter()
        .filter(|id| {
            root.keys
                .get(*id)
                .is_some_and(|key| !key.same_public(online))
        })
        .cloned()
        .collect();
    if ids.is_empty() {
        return Err(WaveError::OfflineSigningNotConfigured);
    }
    Ok(ids)
}

/// Offline signers present in `store` for the given role.
///
/// Held keys are matched to root keys by public value, so each signature is
/// labelled with the key ID the root uses for it.
pub fn resolve_signers<'a>(
    root: &'a RootMeta,
    role: Role,
    online: &TufKey,
    store: &'a OfflineKeyStore,
) -> Result<Vec<KeyMatch<'a>>, WaveError> {
    let candidates = offline_key_ids(root, role, online)?;
    let keyed: Vec<(&str, &TufKey)> = candidates
        .iter()
        .filter_map(|id| root.keys.get_key_value(id))
        .map(|(id, key)| (id.as_str(), key))
        .collect();
    let signers = store.find_signers(&keyed);
    if signers.is_empty() {
        return Err(WaveError::KeyNotFound {
            role: role.to_string(),
            candidates,
        });
    }
    // The server adds the online signature and enforces the threshold.
    let threshold = root.checked_role(role)?.threshold;
    if u32::try_from(signers.len()).unwrap_or(u32::MAX) < threshold {
        debug!(
            "{} offline signature(s) for '{role}' below threshold {threshold}",
            signers.len()
        );
    }
    Ok(signers)
}

/// One signature per signer over `message`.
pub fn sign_all(message: &[u8], signers: &[KeyMatch<'_>]) -> Vec<Signature> {
    signers.iter().map(|s| s.sign(message)).collect()
}

/// Signs a Targets document with every available offline Targets key.
///
/// The returned envelope carries only fresh signatures: any signature on an
/// earlier revision of the document is void once it changes.
pub fn sign_targets(
    targets: TargetsMeta,
    root: &RootMeta,
    online: &TufKey,
    store: &OfflineKeyStore,
) -> Result<Signed<TargetsMeta>, WaveError> {
    let signers = resolve_signers(root, Role::Targets, online, store)?;
    let message = to_canonical_vec(&targets)?;
    let signatures = sign_all(&message, &signers);
    info!(
        "Signed Targets version {} with offline key(s): {}",
        targets.version,
        signatures
            .iter()
            .map(|s| s.keyid.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(Signed {
        signatures,
        signed: targets,
    })
}
