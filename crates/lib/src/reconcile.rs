//! Merging image directories into the install root and removing them again.
//!
//! An image directory is what a package's install step produces. Merging
//! copies (or hardlinks) it into the shared root; the file listing recorded at
//! merge time later drives removal. Removal is digest gated: a file whose
//! content no longer matches its recorded digest belongs to someone else now
//! and is kept unless removal is forced.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::util::hash::{HashAlgorithm, current_digest_like, tagged_digest_file};

/// Administrative directories never merged into the root.
const SKIPPED_DIRS: [&str; 1] = [".svn"];

#[derive(Debug, Error)]
pub enum ReconcileError {
  #[error("failed to walk {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to hash {path}: {source}")]
  Hash {
    path: PathBuf,
    #[source]
    source: crate::util::hash::HashError,
  },

  #[error("failed to copy {from} to {to}: {source}")]
  Copy {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to create directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// One `(relative path, checksum)` pair. An empty checksum matches any content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListedFile {
  pub path: String,
  pub checksum: String,
}

impl ListedFile {
  pub fn new(path: impl Into<String>, checksum: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      checksum: checksum.into(),
    }
  }
}

fn relative_string(path: &Path) -> String {
  path
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

fn is_skipped(entry: &walkdir::DirEntry) -> bool {
  entry.file_type().is_dir()
    && entry
      .file_name()
      .to_str()
      .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

/// List every file below `dir` with its SHA-256 tagged digest, sorted by path.
pub fn list_checksummed(dir: &Path) -> Result<Vec<ListedFile>, ReconcileError> {
  let mut listing = Vec::new();

  for entry in WalkDir::new(dir).follow_links(false) {
    let entry = entry.map_err(|source| ReconcileError::Walk {
      path: dir.to_path_buf(),
      source,
    })?;
    if !entry.file_type().is_file() {
      continue;
    }

    let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
    let checksum = tagged_digest_file(entry.path(), HashAlgorithm::DEFAULT).map_err(|source| ReconcileError::Hash {
      path: entry.path().to_path_buf(),
      source,
    })?;
    listing.push(ListedFile::new(relative_string(relative), checksum));
  }

  listing.sort();
  Ok(listing)
}

/// What a merge did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
  pub copied: usize,
  pub linked: usize,
  /// Destination files that existed and were replaced.
  pub overridden: Vec<PathBuf>,
}

/// Copy or hardlink every regular file of `image` into `root`.
///
/// Existing destination files are replaced with a warning. A failed hardlink
/// falls back to a copy. `.svn` directories in the image are skipped.
pub fn merge_into(image: &Path, root: &Path, hardlink: bool) -> Result<MergeReport, ReconcileError> {
  let mut report = MergeReport::default();

  let walker = WalkDir::new(image)
    .follow_links(false)
    .into_iter()
    .filter_entry(|e| !is_skipped(e));

  for entry in walker {
    let entry = entry.map_err(|source| ReconcileError::Walk {
      path: image.to_path_buf(),
      source,
    })?;
    let relative = entry.path().strip_prefix(image).unwrap_or(entry.path());
    let dest = root.join(relative);

    if entry.file_type().is_dir() {
      fs::create_dir_all(&dest).map_err(|source| ReconcileError::CreateDir { path: dest, source })?;
      continue;
    }
    if !entry.file_type().is_file() {
      debug!(path = %entry.path().display(), "skipping non-regular file");
      continue;
    }

    if dest.exists() {
      warn!(path = %dest.display(), "overriding");
      remove_file_forcefully(&dest).map_err(|source| ReconcileError::Copy {
        from: entry.path().to_path_buf(),
        to: dest.clone(),
        source,
      })?;
      report.overridden.push(dest.clone());
    }

    if hardlink {
      match fs::hard_link(entry.path(), &dest) {
        Ok(()) => {
          report.linked += 1;
          continue;
        }
        Err(e) => warn!(path = %dest.display(), error = %e, "failed to create hardlink, copying instead"),
      }
    }

    fs::copy(entry.path(), &dest).map_err(|source| ReconcileError::Copy {
      from: entry.path().to_path_buf(),
      to: dest.clone(),
      source,
    })?;
    report.copied += 1;
  }

  debug!(image = %image.display(), root = %root.display(), copied = report.copied, linked = report.linked, "merged");
  Ok(report)
}

/// Whether a listed path stays below the root it is joined to.
fn is_contained(relative: &str) -> bool {
  !relative.is_empty()
    && Path::new(relative)
      .components()
      .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// What a removal did, by relative path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemovalReport {
  pub removed: Vec<String>,
  /// Removed despite a digest mismatch.
  pub forced: Vec<String>,
  /// Kept because of a digest mismatch.
  pub retained: Vec<String>,
  pub missing: Vec<String>,
  pub failed: Vec<String>,
}

/// Remove the listed files from `root`.
///
/// A file is deleted when its current digest equals the recorded one, when
/// the recorded digest is empty, or when `forced` is set. Untagged recorded
/// digests are compared against the file's MD5. Never fails; every problem is
/// a warning and shows up in the report.
pub fn remove(root: &Path, listing: &[ListedFile], forced: bool) -> RemovalReport {
  let mut report = RemovalReport::default();

  for file in listing {
    if !is_contained(&file.path) {
      warn!(path = %file.path, root = %root.display(), "listed path escapes the root, refusing to remove it");
      report.failed.push(file.path.clone());
      continue;
    }
    let path = root.join(&file.path);

    if !path.is_file() {
      if !path.is_dir() {
        warn!(path = %path.display(), "file does not exist");
        report.missing.push(file.path.clone());
      }
      continue;
    }

    let current = if file.checksum.is_empty() {
      String::new()
    } else {
      current_digest_like(&path, &file.checksum)
    };
    let matches = file.checksum.is_empty() || (!current.is_empty() && current.eq_ignore_ascii_case(&file.checksum));

    if !matches {
      if !forced {
        warn!(
          path = %path.display(),
          current = %current,
          recorded = %file.checksum,
          "file has a different hash, use force to delete it anyway"
        );
        report.retained.push(file.path.clone());
        continue;
      }
      warn!(
        path = %path.display(),
        current = %current,
        recorded = %file.checksum,
        "file has a different hash, deleting anyway"
      );
    }

    match remove_file_forcefully(&path) {
      Ok(()) => {
        debug!(path = %path.display(), "removed");
        if matches {
          report.removed.push(file.path.clone());
        } else {
          report.forced.push(file.path.clone());
        }
      }
      Err(e) => {
        warn!(path = %path.display(), error = %e, "failed to remove file");
        report.failed.push(file.path.clone());
      }
    }
  }

  report
}

/// Remove a file, clearing a read-only flag if that is what stands in the way.
fn remove_file_forcefully(path: &Path) -> io::Result<()> {
  match fs::remove_file(path) {
    Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
      let mut permissions = fs::metadata(path)?.permissions();
      #[allow(clippy::permissions_set_readonly_false)]
      permissions.set_readonly(false);
      fs::set_permissions(path, permissions)?;
      fs::remove_file(path)
    }
    other => other,
  }
}
