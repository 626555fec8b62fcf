//! Fast CLI tests using assert_cmd.
//! These test the binary directly without needing a container runtime.

#![allow(deprecated)] // assert_cmd::Command::cargo_bin is deprecated but works fine

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

#[test]
fn test_help_flag() {
    Command::cargo_bin("userboxd")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Per-user container lifecycle manager"));
}

#[test]
fn test_version_flag() {
    Command::cargo_bin("userboxd")
        .unwrap()
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn test_subcommand_help() {
    for subcmd in &["serve", "config"] {
        Command::cargo_bin("userboxd")
            .unwrap()
            .args([subcmd, "--help"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty().not());
    }
}

#[test]
fn test_unknown_subcommand_fails() {
    Command::cargo_bin("userboxd")
        .unwrap()
        .arg("nonexistent-subcommand")
        .assert()
        .failure();
}

#[test]
fn test_config_shows_defaults_when_missing() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    Command::cargo_bin("userboxd")
        .unwrap()
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("not created yet"))
        .stdout(predicate::str::contains("[naming]"))
        .stdout(predicate::str::contains("prefix = \"dify\""));
    assert!(!path.exists());
}

#[test]
fn test_config_init_writes_file_once() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("nested").join("config.toml");

    Command::cargo_bin("userboxd")
        .unwrap()
        .args(["config", "--init", "--config"])
        .arg(&path)
        .assert()
        .success();
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("max_users = 100"));

    Command::cargo_bin("userboxd")
        .unwrap()
        .args(["config", "--init", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    Command::cargo_bin("userboxd")
        .unwrap()
        .args(["config", "--init", "--force", "--config"])
        .arg(&path)
        .assert()
        .success();
}

#[test]
fn test_config_reads_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(&path, "[naming]\nprefix = \"acme\"\n").unwrap();

    Command::cargo_bin("userboxd")
        .unwrap()
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("prefix = \"acme\""));
}

#[test]
fn test_serve_missing_explicit_config_fails() {
    let tmp = tempfile::tempdir().unwrap();
    Command::cargo_bin("userboxd")
        .unwrap()
        .args(["serve", "--config"])
        .arg(tmp.path().join("absent.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.toml"));
}

#[test]
fn test_serve_rejects_invalid_config() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    fs::write(&path, "[naming]\nmax_users = 0\n").unwrap();

    Command::cargo_bin("userboxd")
        .unwrap()
        .args(["serve", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_users"));
}

#[test]
fn test_serve_bad_listen_address_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    let data_dir = tmp.path().join("data");
    fs::write(
        &path,
        format!(
            "[runtime]\ncommand = \"userbox-no-such-runtime\"\n\n[provisioner]\ndata_dir = \"{}\"\n",
            data_dir.display()
        ),
    )
    .unwrap();

    Command::cargo_bin("userboxd")
        .unwrap()
        .args(["serve", "--listen", "not-an-address", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to bind not-an-address"));
    assert!(data_dir.is_dir());
}

#[test]
fn test_invalid_provider_rejected() {
    Command::cargo_bin("userboxd")
        .unwrap()
        .args(["serve", "--provider", "lxc"])
        .assert()
        .failure();
}
