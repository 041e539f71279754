use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn list_merge_unmerge_round_trip() {
  let env = TestEnv::new();
  env.write_file("image/bin/zlib1.dll", "dll");
  env.write_file("image/include/zlib.h", "header");
  let image = env.temp.path().join("image");
  let root = env.root_path();

  let listing = env
    .pw_cmd()
    .args(["-o", "json", "list"])
    .arg(&image)
    .output()
    .unwrap();
  assert!(listing.status.success());
  let listing_path = env.temp.path().join("zlib.listing.json");
  std::fs::write(&listing_path, &listing.stdout).unwrap();

  env
    .pw_cmd()
    .arg("merge")
    .arg(&image)
    .assert()
    .success()
    .stdout(predicate::str::is_match(r"Copied:\s+2\n").unwrap());
  assert_eq!(std::fs::read_to_string(root.join("include/zlib.h")).unwrap(), "header");

  std::fs::write(root.join("include/zlib.h"), "edited").unwrap();

  env
    .pw_cmd()
    .arg("unmerge")
    .arg(&listing_path)
    .assert()
    .success()
    .stderr(predicate::str::contains("Kept 1 modified file(s)"));
  assert!(!root.join("bin/zlib1.dll").exists());
  assert!(root.join("include/zlib.h").exists());

  env
    .pw_cmd()
    .args(["unmerge", "--force"])
    .arg(&listing_path)
    .assert()
    .success();
  assert!(!root.join("include/zlib.h").exists());
}

#[test]
fn merge_into_explicit_root_with_hardlinks() {
  let env = TestEnv::new();
  env.write_file("image/share/doc/README", "readme");
  let target = env.temp.path().join("elsewhere");

  env
    .pw_cmd()
    .arg("merge")
    .arg(env.temp.path().join("image"))
    .arg("--root")
    .arg(&target)
    .arg("--hardlink")
    .assert()
    .success();
  assert_eq!(std::fs::read_to_string(target.join("share/doc/README")).unwrap(), "readme");
}

#[test]
fn unmerge_rejects_invalid_listing() {
  let env = TestEnv::new();
  let listing = env.write_file("bad.json", "not json");
  env
    .pw_cmd()
    .arg("unmerge")
    .arg(&listing)
    .assert()
    .failure()
    .stderr(predicate::str::contains("Invalid listing"));
}
