//! CLI smoke tests for pw.
//!
//! These tests verify that the commands that need no install root run
//! without panicking and return appropriate exit codes.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

/// Get a Command for the pw binary.
fn pw_cmd() -> Command {
  cargo_bin_cmd!("pw")
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  pw_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  pw_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("pw"));
}

#[test]
fn subcommand_help_works() {
  for cmd in &["batch", "manifest", "fetch", "classify", "version", "hash", "list", "merge", "unmerge"] {
    pw_cmd()
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

#[test]
fn unknown_subcommand_fails() {
  pw_cmd().arg("frobnicate").assert().failure();
}

// =============================================================================
// Pure commands
// =============================================================================

#[test]
fn classify_git_url() {
  pw_cmd()
    .args(["classify", "git://anongit.kde.org/kdelibs.git|4.x|v4.4.0"])
    .assert()
    .success()
    .stdout(predicate::str::contains("git"))
    .stdout(predicate::str::contains("4.x"))
    .stdout(predicate::str::contains("v4.4.0"));
}

#[test]
fn classify_json_output() {
  pw_cmd()
    .args(["classify", "-o", "json", "https://svn.example.org/trunk"])
    .assert()
    .success()
    .stdout(predicate::str::contains(r#""kind": "svn""#));
}

#[test]
fn version_sorts_oldest_first() {
  pw_cmd()
    .args(["version", "2.4.1", "2.4a1", "2.4", "2.4-1"])
    .assert()
    .success()
    .stdout("2.4a1\n2.4\n2.4-1\n2.4.1\n");
}

#[test]
fn version_latest() {
  pw_cmd()
    .args(["version", "--latest", "1.9", "1.10", "1.10rc1"])
    .assert()
    .success()
    .stdout("1.10\n");
}

#[test]
fn hash_prints_tagged_digest() {
  let temp = tempfile::TempDir::new().unwrap();
  let file = temp.path().join("hello.txt");
  std::fs::write(&file, "hello").unwrap();

  pw_cmd()
    .arg("hash")
    .arg(&file)
    .args(["--algorithm", "sha1"])
    .assert()
    .success()
    .stdout(predicate::str::starts_with("[SHA1]aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"));
}

#[test]
fn hash_rejects_unknown_algorithm() {
  let temp = tempfile::TempDir::new().unwrap();
  let file = temp.path().join("hello.txt");
  std::fs::write(&file, "hello").unwrap();

  pw_cmd()
    .arg("hash")
    .arg(&file)
    .args(["--algorithm", "crc32"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unknown hash algorithm"));
}

#[test]
fn hash_sidecar_mismatch_fails() {
  let temp = tempfile::TempDir::new().unwrap();
  let file = temp.path().join("hello.tar.gz");
  std::fs::write(&file, "hello").unwrap();
  std::fs::write(temp.path().join("hello.tar.gz.sha1"), "0".repeat(40)).unwrap();

  pw_cmd().arg("hash").arg(&file).arg("--sidecar").assert().failure();
}
