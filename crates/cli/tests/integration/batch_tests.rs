#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;

use predicates::prelude::*;

use super::common::TestEnv;

/// A stage driver that fails every stage of `broken/pkg` and echoes the rest.
fn write_driver(env: &TestEnv) -> std::path::PathBuf {
  let driver = env.write_file(
    "bin/driver",
    r#"#!/bin/sh
for last; do :; done
echo "driver $*"
if [ "$last" = "broken/pkg" ]; then
  echo "cannot fetch $last" >&2
  exit 1
fi
"#,
  );
  std::fs::set_permissions(&driver, std::fs::Permissions::from_mode(0o755)).unwrap();
  driver
}

#[test]
fn batch_reports_failed_package_and_continues() {
  let env = TestEnv::new();
  let driver = write_driver(&env);
  let list = env.write_file("packages.txt", "# nightly\nbroken/pkg,,0\nlibs/zlib,1.3,2\n");

  env
    .pw_cmd()
    .env("PORTWRIGHT_DRIVER", &driver)
    .arg("batch")
    .arg(&list)
    .assert()
    .failure()
    .stdout(predicate::str::contains("libs/zlib"))
    .stderr(predicate::str::contains("broken/pkg failed at fetch"))
    .stderr(predicate::str::contains("cannot fetch broken/pkg"));

  let zlib_log = std::fs::read_to_string(env.log_path("libs/zlib")).unwrap();
  assert!(zlib_log.contains("driver --fetch --target=1.3 libs/zlib"));
  assert!(zlib_log.contains("driver --compile -i --target=1.3 libs/zlib"));
  assert!(zlib_log.contains("driver --package --patchlevel=2 --target=1.3 libs/zlib"));
  assert!(env.root_path().join("tmp").join("libs_zlib").is_dir());

  let broken_log = std::fs::read_to_string(env.log_path("broken/pkg")).unwrap();
  assert!(broken_log.contains("--fetch"));
  assert!(!broken_log.contains("--unpack"));
}

#[test]
fn batch_merges_recipe_packages_into_root_and_records_them() {
  let env = TestEnv::new();
  let driver = env.write_file(
    "bin/driver",
    r#"#!/bin/sh
echo "driver $*"
if [ "$1" = "--install" ]; then
  mkdir -p "$PORTWRIGHT_IMAGEDIR/bin"
  echo "demo tool" > "$PORTWRIGHT_IMAGEDIR/bin/demo"
fi
"#,
  );
  std::fs::set_permissions(&driver, std::fs::Permissions::from_mode(0o755)).unwrap();

  let root = env.root_path();
  env.write_file(
    "root/etc/portwright/recipes/tools/demo.json",
    r#"{"name": "tools/demo", "targets": {"2.1": ["https://downloads.example.org/demo/demosrc"]}}"#,
  );
  env.write_file("root/download/demosrc", "sources");
  let list = env.write_file("packages.txt", "tools/demo,2.1,0
");

  env
    .pw_cmd()
    .env("PORTWRIGHT_DRIVER", &driver)
    .env("PORTWRIGHT_OFFLINE", "1")
    .arg("batch")
    .arg(&list)
    .assert()
    .success()
    .stdout(predicate::str::contains("tools/demo"));

  assert_eq!(std::fs::read_to_string(root.join("bin/demo")).unwrap(), "demo tool
");
  assert!(root.join("etc/portwright/installed/tools_demo.json").is_file());

  let log = std::fs::read_to_string(env.log_path("tools/demo")).unwrap();
  assert!(log.contains("fetched tools/demo 2.1"));
  assert!(log.contains("driver --install --target=2.1 tools/demo"));
  assert!(!log.contains("driver --qmerge"));

  let manifest: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(env.manifest_path()).unwrap()).unwrap();
  let entries = manifest["packages"][super::common::TOOLCHAIN].as_array().unwrap();
  let demo = entries.iter().find(|e| e["name"] == "tools/demo").unwrap();
  assert_eq!(demo["files"][0]["fileName"], "tools_demo.json");
  assert_eq!(demo["files"][0]["version"], "2.1");
  assert_eq!(demo["files"][0]["buildPrefix"], root.display().to_string());
}

#[test]
fn batch_json_output() {
  let env = TestEnv::new();
  let driver = write_driver(&env);
  let list = env.write_file("packages.txt", "libs/zlib,,1\n");

  env
    .pw_cmd()
    .env("PORTWRIGHT_DRIVER", &driver)
    .args(["batch", "-o", "json"])
    .arg(&list)
    .assert()
    .success()
    .stdout(predicate::str::contains(r#""state": "done""#))
    .stdout(predicate::str::contains(r#""failed": false"#));
}

#[test]
fn batch_with_missing_list_fails() {
  let env = TestEnv::new();
  env
    .pw_cmd()
    .args(["batch", "/nonexistent/packages.txt"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to read package list"));
}

#[test]
fn invalid_configuration_is_fatal() {
  let env = TestEnv::new();
  let list = env.write_file("packages.txt", "libs/zlib,,1\n");
  env
    .pw_cmd()
    .env("PORTWRIGHT_OFFLINE", "maybe")
    .arg("batch")
    .arg(&list)
    .assert()
    .failure()
    .stderr(predicate::str::contains("Invalid configuration"));
}
