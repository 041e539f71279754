use std::time::Duration;

use portwright_lib::manifest::{BuildManifest, ManifestEntryFile, ManifestError, parse_timestamp};
use portwright_lib::platform::Toolchain;
use tempfile::TempDir;

use super::common::write_file;

fn toolchain() -> Toolchain {
  Toolchain::new("windows-x86-msvc2019")
}

fn local_manifest(temp: &TempDir) -> std::path::PathBuf {
  let path = temp.path().join("etc").join("portwright").join("manifest.json");
  let mut local = BuildManifest::new(toolchain());
  local.get("foo").add_file(
    ManifestEntryFile::new("foo-1.0.7z", "[SHA256]00")
      .with_version("1.0")
      .with_date(parse_timestamp("2020-01-01 00:00:00").unwrap()),
  );
  local.get("bar").add_file(
    ManifestEntryFile::new("bar-2.0.7z", "[SHA256]11")
      .with_version("2.0")
      .with_date(parse_timestamp("2020-01-02 00:00:00").unwrap()),
  );
  local.dump(&path, false).unwrap();
  path
}

#[tokio::test]
async fn remote_entries_take_precedence() {
  let temp = TempDir::new().unwrap();
  let path = local_manifest(&temp);

  let mut remote = BuildManifest::new(toolchain());
  remote.get("foo").add_file(
    ManifestEntryFile::new("foo-1.1.7z", "[SHA256]22")
      .with_version("1.1")
      .with_date(parse_timestamp("2021-06-01 12:00:00").unwrap()),
  );
  let expected_foo = remote.get("foo").clone();

  let mut server = mockito::Server::new_async().await;
  let _mock = server
    .mock("GET", "/repo/manifest.json")
    .with_status(200)
    .with_body(remote.to_json_string().unwrap())
    .create_async()
    .await;

  let urls = vec![format!("{}/repo/", server.url())];
  let merged = BuildManifest::load(&path, &urls, toolchain(), Duration::from_secs(5))
    .await
    .unwrap();

  assert_eq!(merged.entry(&toolchain(), "foo"), Some(&expected_foo));
  let bar = merged.entry(&toolchain(), "bar").unwrap();
  assert_eq!(bar.latest().unwrap().file_name, "bar-2.0.7z");

  // the remote was snapshotted next to the cache
  let snapshots = std::fs::read_dir(path.parent().unwrap())
    .unwrap()
    .filter_map(Result::ok)
    .filter(|e| e.file_name().to_string_lossy().starts_with("manifest-"))
    .count();
  assert!(snapshots >= 1);
}

#[tokio::test]
async fn unreachable_remote_keeps_local_state() {
  let temp = TempDir::new().unwrap();
  let path = local_manifest(&temp);

  let mut server = mockito::Server::new_async().await;
  let _mock = server
    .mock("GET", "/repo/manifest.json")
    .with_status(404)
    .create_async()
    .await;

  let urls = vec![format!("{}/repo", server.url())];
  let merged = BuildManifest::load(&path, &urls, toolchain(), Duration::from_secs(5))
    .await
    .unwrap();

  assert_eq!(merged.entry(&toolchain(), "foo").unwrap().files.len(), 1);
  assert!(merged.entry(&toolchain(), "bar").is_some());
}

#[tokio::test]
async fn unsupported_local_schema_is_fatal() {
  let temp = TempDir::new().unwrap();
  let path = temp.path().join("manifest.json");
  write_file(&path, r#"{"version": 7, "date": "2024-01-01 00:00:00.000000", "packages": {}}"#);

  let err = BuildManifest::load(&path, &[], toolchain(), Duration::from_secs(1))
    .await
    .unwrap_err();
  assert!(matches!(err, ManifestError::UnsupportedVersion(7)));
  assert!(err.is_schema_error());
}

#[test]
fn recorded_builds_round_trip() {
  let temp = TempDir::new().unwrap();
  let path = temp.path().join("manifest.json");

  let mut manifest = BuildManifest::new(toolchain());
  manifest.get("libs/zlib").add_file(ManifestEntryFile::new("zlib.7z", "[SHA256]ab").with_version("1.3"));
  manifest.dump(&path, false).unwrap();

  let loaded = BuildManifest::load_local(&path, toolchain()).unwrap().unwrap();
  assert_eq!(loaded.packages, manifest.packages);
}
