//! Wave creation: promote one CI Targets version into production Targets.
//!
//! `fetch CI targets -> fetch production targets -> merge -> [prune] -> sign
//! -> print (dry run) | submit`. Nothing is persisted locally; every failure
//! aborts before submission.

use log::{debug, info, warn};
use std::collections::BTreeMap;

use crate::api::{FactoryApi, WaveCreate};
use crate::error::WaveError;
use crate::keystore::OfflineKeyStore;
use crate::metadata::{Expires, TargetFile, TargetsMeta};
use crate::signer::sign_targets;

/// Printed after a Wave is created from Targets that carry no static deltas.
pub const STATIC_DELTA_ADVISORY: &str = "\
WARNING: You created a Wave for a Target version without static deltas.

We recommend that you generate static deltas for your production Targets to
optimize OTA update downloads. Once the deltas exist you can cancel this Wave
and create a new one for the same Target version.";

/// Everything needed to derive a Wave.
#[derive(Debug, Clone)]
pub struct WaveRequest {
    pub name: String,
    pub version: u64,
    pub tag: String,
    pub expires: Expires,
    /// CI version labels to drop from production Targets.
    pub prune: Vec<String>,
    /// Only promote CI targets carrying this tag.
    pub source_tag: Option<String>,
}

/// Result of merging (and optionally pruning) Targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub targets: TargetsMeta,
    /// Names of targets taken from CI.
    pub added: Vec<String>,
    /// Names of targets removed by pruning.
    pub pruned: Vec<String>,
}

/// Merges CI targets into the current production Targets for `req.tag`.
///
/// Existing production entries are carried over untouched. Every promoted CI
/// target gets its custom `tags` replaced with exactly `[req.tag]`.
pub fn merge_targets(
    current: Option<&TargetsMeta>,
    ci: &BTreeMap<String, TargetFile>,
    req: &WaveRequest,
) -> Result<Merged, WaveError> {
    let mut targets = TargetsMeta::new(req.version, req.expires);
    if let Some(current) = current {
        if req.version <= current.version {
            return Err(WaveError::VersionNotIncreasing {
                requested: req.version,
                current: current.version,
                tag: req.tag.clone(),
            });
        }
        targets.targets = current.targets.clone();
    }

    let mut added = Vec::new();
    for (name, file) in ci {
        if targets.targets.contains_key(name) {
            return Err(WaveError::TargetExists {
                name: name.clone(),
                tag: req.tag.clone(),
            });
        }
        if let Some(source_tag) = &req.source_tag {
            if !file.has_tag(source_tag) {
                debug!("Skipping {name}: not tagged {source_tag}");
                continue;
            }
        }
        let mut file = file.clone();
        file.replace_tags(&req.tag)
            .map_err(|reason| WaveError::MalformedCustom {
                name: name.clone(),
                reason,
            })?;
        targets.targets.insert(name.clone(), file);
        added.push(name.clone());
    }

    Ok(Merged {
        targets,
        added,
        pruned: Vec::new(),
    })
}

/// Removes every target whose custom `version` equals one of `labels`.
///
/// All-or-nothing: if any label matches no target, the error names every
/// unmatched label and `targets` is left as it was.
pub fn prune_targets(
    targets: &mut TargetsMeta,
    labels: &[String],
    promoting: &str,
) -> Result<Vec<String>, WaveError> {
    if labels.iter().any(|l| l == promoting) {
        return Err(WaveError::PruneCurrentVersion(promoting.to_string()));
    }

    let mut doomed = Vec::new();
    let mut missing = Vec::new();
    for label in labels {
        let before = doomed.len();
        doomed.extend(
            targets
                .targets
                .iter()
                .filter(|(_, file)| file.custom_version() == Some(label.as_str()))
                .map(|(name, _)| name.clone()),
        );
        if doomed.len() == before {
            missing.push(label.clone());
        }
    }
    if !missing.is_empty() {
        return Err(WaveError::PruneVersionsNotFound(missing));
    }

    doomed.sort();
    doomed.dedup();
    for name in &doomed {
        targets.targets.remove(name);
    }
    Ok(doomed)
}

/// Merge followed by the requested pruning.
pub fn build_targets(
    current: Option<&TargetsMeta>,
    ci: &BTreeMap<String, TargetFile>,
    req: &WaveRequest,
) -> Result<Merged, WaveError> {
    let mut merged = merge_targets(current, ci, req)?;
    if !req.prune.is_empty() {
        merged.pruned = prune_targets(
            &mut merged.targets,
            &req.prune,
            &req.version.to_string(),
        )?;
    }
    Ok(merged)
}

/// Newly added targets lacking static delta statistics.
pub fn missing_static_deltas(merged: &Merged) -> Vec<String> {
    merged
        .added
        .iter()
        .filter(|name| {
            merged
                .targets
                .targets
                .get(*name)
                .is_some_and(|file| !file.has_delta_stats())
        })
        .cloned()
        .collect()
}

/// What `init_wave` produced.
#[derive(Debug, Clone)]
pub struct WaveOutcome {
    pub wave: WaveCreate,
    pub submitted: bool,
    pub pruned: Vec<String>,
    pub missing_static_deltas: Vec<String>,
}

/// Builds, signs, and (unless `dry_run`) submits a Wave.
pub fn init_wave<A: FactoryApi + ?Sized>(
    api: &A,
    store: &OfflineKeyStore,
    req: &WaveRequest,
    dry_run: bool,
) -> Result<WaveOutcome, WaveError> {
    debug!(
        "Creating Wave {} for Targets version {} and tag {}",
        req.name, req.version, req.tag
    );

    let ci = api
        .ci_targets(req.version)
        .map_err(WaveError::api("Failed to fetch CI Targets"))?;
    if ci.is_empty() {
        return Err(WaveError::NoTargetsForVersion(req.version));
    }
    let current = api
        .prod_targets(&req.tag)
        .map_err(WaveError::api("Failed to fetch production Targets"))?;

    let merged = build_targets(current.as_ref().map(|s| &s.signed), &ci, req)?;
    let without_deltas = missing_static_deltas(&merged);
    if !without_deltas.is_empty() {
        warn!("Targets without static deltas: {}", without_deltas.join(", "));
    }

    let root = api
        .tuf_root()
        .map_err(WaveError::api("Failed to fetch root role"))?;
    let online = api
        .targets_online_key()
        .map_err(WaveError::api("Failed to fetch online Targets public key"))?;
    let signed = sign_targets(merged.targets, &root.signed, &online, store)?;

    let wave = WaveCreate {
        name: req.name.clone(),
        version: req.version.to_string(),
        tag: req.tag.clone(),
        targets: signed,
    };
    if !dry_run {
        api.create_wave(&wave)
            .map_err(WaveError::api("Failed to create a Wave"))?;
        info!("Created Wave {}", wave.name);
    }

    Ok(WaveOutcome {
        wave,
        submitted: !dry_run,
        pruned: merged.pruned,
        missing_static_deltas: without_deltas,
    })
}
