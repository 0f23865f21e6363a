use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

fn pipelinectl(root: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pipelinectl"));
    cmd.arg("--root").arg(root).env("HOME", root).env("NO_COLOR", "1");
    cmd
}

fn write_spec(dir: &Path, file: &str, contents: &str) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, contents).expect("write spec");
    path
}

fn get_json(root: &Path) -> Vec<Value> {
    let output = pipelinectl(root)
        .args(["get", "--json"])
        .output()
        .expect("run get");
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).expect("get --json output")
}

#[test]
fn apply_sync_and_inspect() {
    let root = TempDir::new().expect("root");
    let spec = write_spec(
        root.path(),
        "build.yaml",
        "type: pipeline\npipeline:\n  stages:\n    - checkout\n    - test\n",
    );

    pipelinectl(root.path())
        .args(["namespace", "create", "team-a"])
        .assert()
        .success()
        .stdout(contains("namespace 'team-a' created"));
    pipelinectl(root.path())
        .args(["apply", "team-a/build", "-f"])
        .arg(&spec)
        .assert()
        .success()
        .stdout(contains("version 1"));

    let rows = get_json(root.path());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["state"], "pending");

    pipelinectl(root.path())
        .args(["sync", "team-a/build"])
        .assert()
        .success()
        .stdout(contains("created job config"));

    let rows = get_json(root.path());
    assert_eq!(rows[0]["state"], "synced");
    assert_eq!(rows[0]["finalized"], true);
    assert_eq!(rows[0]["synced_hash"], rows[0]["spec_hash"]);

    pipelinectl(root.path())
        .args(["sync", "--all"])
        .assert()
        .success()
        .stdout(contains("up to date"));

    pipelinectl(root.path())
        .arg("jobs")
        .assert()
        .success()
        .stdout(contains("team-a/build"));

    let hash = rows[0]["spec_hash"].as_str().expect("hash").to_string();
    pipelinectl(root.path())
        .args(["hash", "-f"])
        .arg(&spec)
        .assert()
        .success()
        .stdout(contains(hash));
}

#[test]
fn delete_waits_for_finalizer_then_removes() {
    let root = TempDir::new().expect("root");
    let spec = write_spec(root.path(), "build.json", r#"{"stages": ["checkout"]}"#);

    pipelinectl(root.path())
        .args(["namespace", "create", "team-a"])
        .assert()
        .success();
    pipelinectl(root.path())
        .args(["apply", "team-a/build", "-f"])
        .arg(&spec)
        .assert()
        .success();
    pipelinectl(root.path())
        .args(["sync", "team-a/build"])
        .assert()
        .success();

    pipelinectl(root.path())
        .args(["delete", "team-a/build"])
        .assert()
        .success()
        .stdout(contains("marked for deletion"))
        .stdout(contains("finalizers.devops.io/pipeline"));
    assert_eq!(get_json(root.path())[0]["state"], "deleting");

    pipelinectl(root.path())
        .args(["sync", "team-a/build"])
        .assert()
        .success()
        .stdout(contains("released finalizer"));

    assert!(get_json(root.path()).is_empty());
    pipelinectl(root.path())
        .args(["jobs", "--json"])
        .assert()
        .success()
        .stdout(contains("[]"));
}

#[test]
fn unmanaged_namespace_fails_unless_dropped() {
    let root = TempDir::new().expect("root");
    let spec = write_spec(root.path(), "build.yaml", "stages: [checkout]\n");

    pipelinectl(root.path())
        .args(["namespace", "create", "scratch", "--unmanaged"])
        .assert()
        .success()
        .stdout(contains("unmanaged"));
    pipelinectl(root.path())
        .args(["apply", "scratch/build", "-f"])
        .arg(&spec)
        .assert()
        .success();

    pipelinectl(root.path())
        .args(["sync", "scratch/build"])
        .assert()
        .failure()
        .stdout(contains("not a DevOps project namespace"));

    pipelinectl(root.path())
        .args(["sync", "scratch/build", "--drop-ineligible"])
        .assert()
        .success()
        .stdout(contains("namespace not managed"));

    pipelinectl(root.path())
        .args(["jobs", "--json"])
        .assert()
        .success()
        .stdout(contains("[]"));
}

#[test]
fn malformed_keys_are_rejected() {
    let root = TempDir::new().expect("root");
    let spec = write_spec(root.path(), "build.yaml", "stages: []\n");

    pipelinectl(root.path())
        .args(["apply", "a/b/c", "-f"])
        .arg(&spec)
        .assert()
        .failure()
        .stderr(contains("invalid pipeline key"));
    pipelinectl(root.path())
        .args(["delete", "no-namespace"])
        .assert()
        .failure()
        .stderr(contains("expected <namespace>/<name>"));
}

#[test]
fn hash_ignores_key_order_and_format() {
    let root = TempDir::new().expect("root");
    let yaml = write_spec(root.path(), "a.yaml", "b: 2\na:\n  y: [1, 2]\n  x: true\n");
    let json = write_spec(root.path(), "b.json", r#"{"a": {"x": true, "y": [1, 2]}, "b": 2}"#);

    let first = pipelinectl(root.path())
        .args(["hash", "-f"])
        .arg(&yaml)
        .output()
        .expect("hash yaml");
    let second = pipelinectl(root.path())
        .args(["hash", "-f"])
        .arg(&json)
        .output()
        .expect("hash json");

    assert!(first.status.success() && second.status.success());
    assert_eq!(first.stdout, second.stdout);
    assert_eq!(String::from_utf8_lossy(&first.stdout).trim().len(), 16);
}
