use portwright_lib::reconcile::{list_checksummed, merge_into, remove};
use tempfile::TempDir;

use super::common::write_file;

#[test]
fn merge_then_unmerge_respects_local_edits() {
  let temp = TempDir::new().unwrap();
  let image = temp.path().join("image");
  let root = temp.path().join("root");
  write_file(&image.join("bin/zlib1.dll"), "dll");
  write_file(&image.join("include/zlib.h"), "header");
  write_file(&image.join("share/doc/zlib/README"), "readme");

  let listing = list_checksummed(&image).unwrap();
  let report = merge_into(&image, &root, false).unwrap();
  assert_eq!(report.copied, 3);
  assert!(report.overridden.is_empty());

  // another package took over the header
  write_file(&root.join("include/zlib.h"), "someone else's header");

  let removal = remove(&root, &listing, false);
  assert_eq!(removal.removed.len(), 2);
  assert_eq!(removal.retained, ["include/zlib.h"]);
  assert!(root.join("include/zlib.h").exists());
  assert!(!root.join("bin/zlib1.dll").exists());

  // uninstalling twice is tolerated
  let again = remove(&root, &listing, true);
  assert_eq!(again.forced, ["include/zlib.h"]);
  assert_eq!(again.missing.len(), 2);
  assert!(!root.join("include/zlib.h").exists());
}

#[test]
fn remerge_overrides_existing_files() {
  let temp = TempDir::new().unwrap();
  let image = temp.path().join("image");
  let root = temp.path().join("root");
  write_file(&image.join("bin/tool.exe"), "v2");
  write_file(&root.join("bin/tool.exe"), "v1");

  let report = merge_into(&image, &root, true).unwrap();
  assert_eq!(report.overridden, [root.join("bin/tool.exe")]);
  assert_eq!(std::fs::read_to_string(root.join("bin/tool.exe")).unwrap(), "v2");
}
