use predicates::prelude::*;

use super::common::TestEnv;

const RECIPE: &str = r#"{
  "name": "tools/blob",
  "targets": {
    "1.0": ["https://downloads.example.org/1.0/blobdata"],
    "1.1": ["https://downloads.example.org/1.1/blobdata"]
  }
}"#;

#[test]
fn offline_fetch_uses_existing_download() {
  let env = TestEnv::new();
  let recipe = env.write_file("blob.json", RECIPE);
  let root = env.root_path();
  std::fs::create_dir_all(root.join("download")).unwrap();
  std::fs::write(root.join("download/blobdata"), "payload").unwrap();

  let out = env
    .pw_cmd()
    .env("PORTWRIGHT_OFFLINE", "1")
    .args(["-o", "json", "fetch"])
    .arg(&recipe)
    .arg("--unpack")
    .arg(env.temp.path().join("work"))
    .output()
    .unwrap();
  assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

  let doc: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
  assert_eq!(doc["package"], "tools/blob");
  assert_eq!(doc["target"], "1.1");
  assert_eq!(doc["kind"], "download");
  assert!(doc["paths"][0].as_str().unwrap().ends_with("blobdata"));
}

#[test]
fn unknown_target_fails() {
  let env = TestEnv::new();
  let recipe = env.write_file("blob.json", RECIPE);

  env
    .pw_cmd()
    .env("PORTWRIGHT_OFFLINE", "1")
    .arg("fetch")
    .arg(&recipe)
    .args(["-t", "2.0"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("has no target \"2.0\""));
}
