use predicates::prelude::*;

use super::common::{TOOLCHAIN, TestEnv};

#[test]
fn show_without_manifest() {
  let env = TestEnv::new();
  env
    .pw_cmd()
    .args(["manifest", "show"])
    .assert()
    .success()
    .stdout(predicate::str::contains("No manifest"));
}

#[test]
fn record_then_show() {
  let env = TestEnv::new();
  let archive = env.write_file("out/zlib-1.3-bin.7z", "archive");

  env
    .pw_cmd()
    .args(["manifest", "record", "libs/zlib"])
    .arg(&archive)
    .args(["--version", "1.3", "--build-prefix", "/opt/pw", "--option", "shared=on"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Recorded zlib-1.3-bin.7z for libs/zlib"));

  let content = std::fs::read_to_string(env.manifest_path()).unwrap();
  let document: serde_json::Value = serde_json::from_str(&content).unwrap();
  assert_eq!(document["version"], 1);
  let entry = &document["packages"][TOOLCHAIN][0];
  assert_eq!(entry["name"], "libs/zlib");
  assert_eq!(entry["files"][0]["fileName"], "zlib-1.3-bin.7z");
  assert_eq!(entry["files"][0]["buildPrefix"], "/opt/pw");
  assert_eq!(entry["files"][0]["options"]["shared"], "on");
  assert!(entry["files"][0]["checksum"].as_str().unwrap().starts_with("[SHA256]"));

  env
    .pw_cmd()
    .args(["manifest", "show", "libs/zlib"])
    .assert()
    .success()
    .stdout(predicate::str::contains(TOOLCHAIN))
    .stdout(predicate::str::contains("libs/zlib 1.3 (zlib-1.3-bin.7z [SHA256]"));
}

#[test]
fn record_defaults_build_prefix_to_root() {
  let env = TestEnv::new();
  let archive = env.write_file("out/bzip2-1.0.8-bin.7z", "archive");

  let output = env
    .pw_cmd()
    .args(["-o", "json", "manifest", "record", "libs/bzip2"])
    .arg(&archive)
    .args(["--version", "1.0.8"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let recorded: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(recorded["buildPrefix"], env.root_path().display().to_string());
}

#[test]
fn newer_record_comes_first() {
  let env = TestEnv::new();
  let old = env.write_file("out/zlib-1.2.7z", "old");
  let new = env.write_file("out/zlib-1.3.7z", "new");

  for (file, version) in [(&old, "1.2"), (&new, "1.3")] {
    env
      .pw_cmd()
      .args(["manifest", "record", "libs/zlib"])
      .arg(file)
      .args(["--version", version])
      .assert()
      .success();
  }

  env
    .pw_cmd()
    .args(["-o", "json", "manifest", "show"])
    .assert()
    .success()
    .stdout(predicate::str::is_match(r#"(?s)"fileName": "zlib-1.3.7z".*"fileName": "zlib-1.2.7z""#).unwrap());
}

#[test]
fn sync_without_remotes_writes_local_cache() {
  let env = TestEnv::new();
  env
    .pw_cmd()
    .args(["manifest", "sync"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Manifest written"));
  assert!(env.manifest_path().exists());
}

#[test]
fn unsupported_schema_is_fatal() {
  let env = TestEnv::new();
  let path = env.manifest_path();
  std::fs::create_dir_all(path.parent().unwrap()).unwrap();
  std::fs::write(&path, r#"{"version": 9, "date": "2024-01-01 00:00:00", "packages": {}}"#).unwrap();

  env
    .pw_cmd()
    .args(["manifest", "sync"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("unsupported manifest version"));
}
