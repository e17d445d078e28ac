//! Factory snapshot fixtures shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::SigningKey;
use flate2::{write::GzEncoder, Compression};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use tufwave::metadata::TufKey;

pub const OFFLINE_SEED: u8 = 1;
pub const ONLINE_SEED: u8 = 2;
pub const SPARE_SEED: u8 = 3;

pub fn public_key(seed: u8) -> TufKey {
    TufKey::ed25519(SigningKey::from_bytes(&[seed; 32]).verifying_key().as_bytes())
}

pub fn key_id(seed: u8) -> String {
    public_key(seed).key_id().unwrap()
}

/// A private key file as exported by the factory's key tooling.
pub fn key_file(seed: u8) -> Vec<u8> {
    let sk = SigningKey::from_bytes(&[seed; 32]);
    serde_json::to_vec(&json!({
        "keytype": "ed25519",
        "keyval": {
            "public": STANDARD.encode(sk.verifying_key().as_bytes()),
            "private": STANDARD.encode(sk.to_keypair_bytes()),
        }
    }))
    .unwrap()
}

/// A gzip-compressed tar holding `tufrepo/keys/<n>.sec` for every seed.
pub fn credentials(seeds: &[u8]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for seed in seeds {
        let data = key_file(*seed);
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o600);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("tufrepo/keys/key-{seed}.sec"), &data[..])
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn target(version: &str, tags: &[&str], with_deltas: bool) -> Value {
    let mut custom = json!({
        "version": version,
        "tags": tags,
        "hardwareIds": ["intel-corei7-64"],
        "targetFormat": "OSTREE",
        "name": "lmp",
    });
    if with_deltas {
        custom["delta-stats"] = json!({"sha256": "ab".repeat(32), "size": 4096});
    }
    json!({
        "hashes": {"sha256": format!("{version:0>64}")},
        "length": 0,
        "custom": custom,
    })
}

pub fn targets_doc(version: u64, targets: Value) -> Value {
    json!({
        "signatures": [],
        "signed": {
            "_type": "Targets",
            "expires": "2030-01-01T00:00:00Z",
            "version": version,
            "targets": targets,
        }
    })
}

pub struct Factory {
    pub dir: TempDir,
    pub keys: PathBuf,
}

impl Factory {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, value: &Value) {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
    }

    pub fn read(&self, rel: &str) -> Value {
        serde_json::from_slice(&fs::read(self.dir.path().join(rel)).unwrap()).unwrap()
    }

    /// Replaces the credentials archive.
    pub fn set_credentials(&self, seeds: &[u8]) {
        fs::write(&self.keys, credentials(seeds)).unwrap();
    }
}

/// Root with Targets keys {offline, online, spare}, production at version
/// 10, CI builds 15 and 16, and the offline key in the credentials archive.
pub fn factory() -> Factory {
    let dir = tempfile::tempdir().unwrap();
    let seeds = [OFFLINE_SEED, ONLINE_SEED, SPARE_SEED];
    let keys: serde_json::Map<String, Value> = seeds
        .iter()
        .map(|s| (key_id(*s), serde_json::to_value(public_key(*s)).unwrap()))
        .collect();
    let ids: Vec<String> = seeds.iter().map(|s| key_id(*s)).collect();

    let factory = Factory {
        keys: dir.path().join("offline-creds.tgz"),
        dir,
    };
    factory.write(
        "root.json",
        &json!({
            "signatures": [],
            "signed": {
                "_type": "Root",
                "consistent_snapshot": false,
                "expires": "2031-01-01T00:00:00Z",
                "version": 4,
                "keys": keys,
                "roles": {
                    "root": {"keyids": [key_id(ONLINE_SEED)], "threshold": 1},
                    "targets": {"keyids": ids, "threshold": 1},
                },
            }
        }),
    );
    factory.write(
        "targets-online-key.json",
        &serde_json::to_value(public_key(ONLINE_SEED)).unwrap(),
    );
    factory.write(
        "ci-targets.json",
        &targets_doc(
            40,
            json!({
                "intel-corei7-64-lmp-15": target("15", &["main"], true),
                "intel-corei7-64-lmp-16": target("16", &["main"], false),
                "raspberrypi4-64-lmp-16": target("16", &["devel"], true),
            }),
        ),
    );
    factory.write(
        "prod/production.json",
        &targets_doc(
            10,
            json!({"intel-corei7-64-lmp-10": target("10", &["production"], true)}),
        ),
    );
    factory.set_credentials(&[OFFLINE_SEED]);
    factory
}
