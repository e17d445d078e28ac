//! Integration tests for the tufwave binary.
//!
//! These tests invoke the compiled `tufwave` binary against a factory
//! snapshot directory and check its output, exit status, and the files it
//! leaves behind.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::path::PathBuf;
use std::process::{Command, Output};

use common::{factory, key_id, targets_doc, Factory, OFFLINE_SEED, SPARE_SEED};
use tufwave::api::WaveCreate;
use tufwave::metadata::{Role, RootMeta, Signed};

fn tufwave_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_tufwave"))
}

fn run(args: &[&str]) -> Output {
    Command::new(tufwave_bin())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run tufwave")
}

fn wave_init(f: &Factory, extra: &[&str]) -> Output {
    let dir = f.path().to_str().unwrap();
    let keys = f.keys.to_str().unwrap();
    let mut args = vec![
        "wave",
        "init",
        "w1",
        "16",
        "production",
        "--factory-dir",
        dir,
        "--keys",
        keys,
    ];
    args.extend_from_slice(extra);
    run(&args)
}

fn updates_apply(f: &Factory, extra: &[&str]) -> Output {
    let dir = f.path().to_str().unwrap();
    let mut args = vec!["updates", "apply", "--factory-dir", dir];
    args.extend_from_slice(extra);
    run(&args)
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn root(f: &Factory) -> RootMeta {
    let signed: Signed<RootMeta> = serde_json::from_value(f.read("root.json")).unwrap();
    signed.signed
}

// -------------------------------------------------------------------------
// wave init
// -------------------------------------------------------------------------

#[test]
fn dry_run_prints_signed_wave_and_creates_nothing() {
    let f = factory();
    let out = wave_init(
        &f,
        &["--dry-run", "--expires-at", "2031-06-01T14:30:15.750+02:00"],
    );
    assert!(out.status.success(), "stderr: {}", stderr(&out));

    let wave: WaveCreate = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(wave.name, "w1");
    assert_eq!(wave.version, "16");
    assert_eq!(wave.tag, "production");

    let targets = &wave.targets.signed;
    assert_eq!(targets.version, 16);
    assert_eq!(targets.expires.to_rfc3339().unwrap(), "2031-06-01T12:30:15Z");
    let names: Vec<&str> = targets.targets.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec![
            "intel-corei7-64-lmp-10",
            "intel-corei7-64-lmp-16",
            "raspberrypi4-64-lmp-16",
        ]
    );
    assert_eq!(
        targets.targets["raspberrypi4-64-lmp-16"].custom_tags(),
        vec!["production"]
    );

    assert_eq!(wave.targets.signatures.len(), 1);
    assert_eq!(wave.targets.signatures[0].keyid, key_id(OFFLINE_SEED));
    assert!(wave.targets.meets_threshold(&root(&f), Role::Targets).unwrap());

    assert!(!f.path().join("waves").exists());
}

#[test]
fn submit_writes_wave_once() {
    let f = factory();
    let out = wave_init(&f, &[]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("Created Wave w1"));

    let stored: WaveCreate = serde_json::from_value(f.read("waves/w1.json")).unwrap();
    assert!(stored.targets.meets_threshold(&root(&f), Role::Targets).unwrap());

    let again = wave_init(&f, &[]);
    assert!(!again.status.success());
    assert!(stderr(&again).contains("409"), "stderr: {}", stderr(&again));
}

#[test]
fn static_delta_advisory_is_printed_but_does_not_fail() {
    let f = factory();
    let out = wave_init(&f, &["--dry-run"]);
    assert!(out.status.success());
    assert!(stderr(&out).contains("without static deltas"));

    f.write("tufwave.json", &serde_json::json!({"warn_missing_static_deltas": false}));
    let quiet = wave_init(&f, &["--dry-run"]);
    assert!(quiet.status.success());
    assert!(!stderr(&quiet).contains("WARNING: You created a Wave"));
}

#[test]
fn source_tag_limits_promoted_targets() {
    let f = factory();
    let out = wave_init(&f, &["--dry-run", "--source-tag", "main"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let wave: WaveCreate = serde_json::from_slice(&out.stdout).unwrap();
    assert!(wave.targets.signed.targets.contains_key("intel-corei7-64-lmp-16"));
    assert!(!wave.targets.signed.targets.contains_key("raspberrypi4-64-lmp-16"));
}

#[test]
fn prune_removes_old_version() {
    let f = factory();
    let out = wave_init(&f, &["--dry-run", "--prune", "10"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let wave: WaveCreate = serde_json::from_slice(&out.stdout).unwrap();
    assert!(!wave.targets.signed.targets.contains_key("intel-corei7-64-lmp-10"));
    assert_eq!(wave.targets.signed.targets.len(), 2);
}

#[test]
fn prune_of_unknown_versions_names_them_all() {
    let f = factory();
    let out = wave_init(&f, &["--prune", "3,10,4"]);
    assert!(!out.status.success());
    assert!(
        stderr(&out).contains("Unable to prune the following versions: 3,4"),
        "stderr: {}",
        stderr(&out)
    );
    assert!(!f.path().join("waves").exists());
}

#[test]
fn unknown_ci_version_fails() {
    let f = factory();
    let dir = f.path().to_str().unwrap();
    let keys = f.keys.to_str().unwrap();
    let out = run(&[
        "wave", "init", "w1", "99", "production", "--factory-dir", dir, "--keys", keys,
    ]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("No targets found for version 99"));
}

#[test]
fn stale_version_fails() {
    let f = factory();
    f.write(
        "prod/production.json",
        &targets_doc(20, serde_json::json!({})),
    );
    let out = wave_init(&f, &["--dry-run"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("already at version 20"), "stderr: {}", stderr(&out));
}

#[test]
fn credentials_without_offline_key_fail() {
    let f = factory();
    f.set_credentials(&[]);
    let out = wave_init(&f, &["--dry-run"]);
    assert!(!out.status.success());
    assert!(
        stderr(&out).contains("were found in the offline credentials"),
        "stderr: {}",
        stderr(&out)
    );
}

#[test]
fn every_offline_key_held_signs() {
    let f = factory();
    f.set_credentials(&[OFFLINE_SEED, SPARE_SEED]);
    let out = wave_init(&f, &["--dry-run"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let wave: WaveCreate = serde_json::from_slice(&out.stdout).unwrap();
    let mut ids: Vec<_> = wave.targets.signatures.iter().map(|s| s.keyid.clone()).collect();
    ids.sort();
    let mut expected = vec![key_id(OFFLINE_SEED), key_id(SPARE_SEED)];
    expected.sort();
    assert_eq!(ids, expected);
    assert_eq!(
        wave.targets.count_valid_signatures(&root(&f), Role::Targets).unwrap(),
        2
    );
}

#[test]
fn corrupt_credentials_archive_fails() {
    let f = factory();
    std::fs::write(&f.keys, b"definitely not gzip").unwrap();
    let out = wave_init(&f, &["--dry-run"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("Failed to load offline keys"));
}

#[test]
fn unrepresentable_expiration_is_an_error() {
    let f = factory();
    let out = wave_init(&f, &["--dry-run", "--expires-days", "4000000"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("Invalid expiration of 4000000 days"), "stderr: {err}");
    assert!(!err.contains("panicked"), "stderr: {err}");

    let out = wave_init(&f, &["--dry-run", "--expires-at", "9999-12-31T23:59:59-01:00"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("outside the supported range"), "stderr: {err}");
    assert!(!err.contains("panicked"), "stderr: {err}");
}

#[test]
fn unknown_settings_field_is_rejected() {
    let f = factory();
    f.write("tufwave.json", &serde_json::json!({"expire_days": 30}));
    let out = wave_init(&f, &["--dry-run"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("Failed to load settings"));
}

// -------------------------------------------------------------------------
// updates apply
// -------------------------------------------------------------------------

#[test]
fn apply_staged_update() {
    let f = factory();
    f.write(
        "tuf-updates.json",
        &serde_json::json!({"status": "staged", "txid": "tx-42"}),
    );
    let out = updates_apply(&f, &["--txid", "tx-42"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("safe place"));
    assert_eq!(f.read("tuf-updates.json")["status"], "applied");
}

#[test]
fn apply_with_nothing_staged_succeeds_quietly() {
    let f = factory();
    let out = updates_apply(&f, &[]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("nothing to apply"));
}

#[test]
fn apply_wrong_transaction_offers_retry_or_cancel() {
    let f = factory();
    f.write(
        "tuf-updates.json",
        &serde_json::json!({"status": "staged", "txid": "tx-42"}),
    );
    let out = updates_apply(&f, &["--txid", "tx-41"]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("No changes were made"), "stderr: {err}");
    assert!(err.contains("cancel"), "stderr: {err}");
    assert_eq!(err.matches("does not match staged transaction").count(), 1, "stderr: {err}");
    assert_eq!(f.read("tuf-updates.json")["status"], "staged");
}

#[test]
fn apply_with_unreadable_state_never_suggests_cancel() {
    let f = factory();
    std::fs::write(f.path().join("tuf-updates.json"), b"{ truncated").unwrap();
    let out = updates_apply(&f, &[]);
    assert!(!out.status.success());
    let err = stderr(&out);
    assert!(err.contains("partially applied"), "stderr: {err}");
    assert!(!err.to_lowercase().contains("cancel"), "stderr: {err}");
}
