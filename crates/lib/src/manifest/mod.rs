//! The build manifest: a versioned, mergeable record of what has been built.
//!
//! Records are namespaced by toolchain identity and package name. The local
//! copy lives in the etc directory and is refreshed from remote package
//! repositories, which publish their own `manifest.json`.
//!
//! # Document format
//!
//! ```json
//! {
//!   "date": "2024-05-01 12:00:00.000000",
//!   "origin": "https://files.example.org/repo",
//!   "packages": {
//!     "windows-x86_64-msvc": [
//!       {
//!         "files": [
//!           {
//!             "buildPrefix": "C:/pw",
//!             "checksum": "[SHA256]9f86d0...",
//!             "date": "2024-05-01 11:00:00.000000",
//!             "fileName": "zlib-1.3-windows-x86_64-msvc.7z",
//!             "options": {},
//!             "version": "1.3"
//!           }
//!         ],
//!         "name": "libs/zlib"
//!       }
//!     ]
//!   },
//!   "version": 1
//! }
//! ```
//!
//! Documents without a `version` field are schema 0,
//! `{package: {fileName: {checksum}}}`, and are migrated on load.

pub mod remote;
mod types;

pub use types::*;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::platform::Toolchain;
use crate::util::fs::write_atomic;

/// Current manifest schema version.
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write manifest {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse manifest: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize manifest: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported manifest version {0}, expected {MANIFEST_VERSION}")]
  UnsupportedVersion(u64),

  #[error("request to {url} failed: {source}")]
  Http {
    url: String,
    #[source]
    source: reqwest::Error,
  },
}

impl ManifestError {
  /// Schema errors abort a load; everything else is recoverable.
  pub fn is_schema_error(&self) -> bool {
    matches!(self, Self::Parse(_) | Self::UnsupportedVersion(_))
  }
}

/// Toolchain identity → package name → entry.
pub type PackageMap = BTreeMap<String, BTreeMap<String, ManifestEntry>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildManifest {
  pub date: NaiveDateTime,
  /// Repository URL this manifest was fetched from.
  pub origin: Option<String>,
  pub packages: PackageMap,
  toolchain: Toolchain,
}

impl BuildManifest {
  /// An empty manifest with an empty namespace for `toolchain`.
  pub fn new(toolchain: Toolchain) -> Self {
    let mut packages = PackageMap::new();
    packages.insert(toolchain.to_string(), BTreeMap::new());
    Self {
      date: now(),
      origin: None,
      packages,
      toolchain,
    }
  }

  /// The toolchain `get` records under.
  pub fn toolchain(&self) -> &Toolchain {
    &self.toolchain
  }

  /// The entry for `package` under the current toolchain, created if absent.
  pub fn get(&mut self, package: &str) -> &mut ManifestEntry {
    self
      .packages
      .entry(self.toolchain.to_string())
      .or_default()
      .entry(package.to_string())
      .or_insert_with(|| ManifestEntry::new(package))
  }

  /// Look up an entry without creating it.
  pub fn entry(&self, toolchain: &Toolchain, package: &str) -> Option<&ManifestEntry> {
    self.packages.get(toolchain.as_str())?.get(package)
  }

  /// Merge `other` into `self`: per toolchain, same-named entries are replaced.
  pub fn update(&mut self, other: &BuildManifest) {
    for (toolchain, entries) in &other.packages {
      let target = self.packages.entry(toolchain.clone()).or_default();
      for (name, entry) in entries {
        target.insert(name.clone(), entry.clone());
      }
    }
  }

  /// Parse a manifest document, migrating schema 0.
  pub fn from_json_str(content: &str, toolchain: Toolchain) -> Result<Self, ManifestError> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(ManifestError::Parse)?;

    let version = match value.get("version") {
      None => 0,
      Some(v) => v.as_u64().ok_or_else(|| {
        ManifestError::Parse(serde::de::Error::custom(format!("invalid manifest version {}", v)))
      })?,
    };

    match version {
      0 => {
        let legacy: LegacyDocument = serde_json::from_value(value).map_err(ManifestError::Parse)?;
        Ok(Self::migrate0(legacy, toolchain))
      }
      v if v == u64::from(MANIFEST_VERSION) => {
        let document: ManifestDocument = serde_json::from_value(value).map_err(ManifestError::Parse)?;
        let mut manifest = Self::new(toolchain);
        manifest.date = document.date;
        manifest.origin = document.origin;
        for (toolchain, entries) in document.packages {
          let namespace = manifest.packages.entry(toolchain).or_default();
          for mut entry in entries {
            entry.sort_files();
            namespace.insert(entry.name.clone(), entry);
          }
        }
        Ok(manifest)
      }
      other => Err(ManifestError::UnsupportedVersion(other)),
    }
  }

  fn migrate0(legacy: LegacyDocument, toolchain: Toolchain) -> Self {
    info!(toolchain = %toolchain, packages = legacy.len(), "migrating legacy manifest");
    let mut manifest = Self::new(toolchain);
    for (package, files) in legacy {
      let entry = manifest.get(&package);
      for (file_name, file) in files {
        entry.add_file(ManifestEntryFile::new(file_name, file.checksum).with_date(sentinel_date()));
      }
    }
    manifest
  }

  /// Serialize as pretty JSON with sorted keys.
  pub fn to_json_string(&self) -> Result<String, ManifestError> {
    let document = ManifestDocument {
      date: self.date,
      origin: self.origin.clone(),
      packages: self
        .packages
        .iter()
        .map(|(toolchain, entries)| (toolchain.clone(), entries.values().cloned().collect()))
        .collect(),
      version: MANIFEST_VERSION,
    };
    serde_json::to_string_pretty(&document).map_err(ManifestError::Serialize)
  }

  /// Name of the dated snapshot of `path`: `<stem>-YYYYmmddTHHMMSS<ext>`.
  pub fn snapshot_path(&self, path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let stamp = self.date.format("%Y%m%dT%H%M%S");
    let name = match path.extension() {
      Some(ext) => format!("{}-{}.{}", stem, stamp, ext.to_string_lossy()),
      None => format!("{}-{}", stem, stamp),
    };
    path.with_file_name(name)
  }

  /// Write the manifest and refresh its date.
  ///
  /// With `include_time` the file goes to the dated snapshot name derived
  /// from the date before the refresh. Returns the path written.
  pub fn dump(&mut self, path: &Path, include_time: bool) -> Result<PathBuf, ManifestError> {
    let target = if include_time {
      self.snapshot_path(path)
    } else {
      path.to_path_buf()
    };

    self.date = now();
    let content = self.to_json_string()?;
    write_atomic(&target, content.as_bytes()).map_err(|source| ManifestError::Write {
      path: target.clone(),
      source,
    })?;

    debug!(path = %target.display(), "manifest written");
    Ok(target)
  }

  /// Load the local cache. `Ok(None)` when there is no file.
  pub fn load_local(path: &Path, toolchain: Toolchain) -> Result<Option<Self>, ManifestError> {
    let content = match std::fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(source) => {
        return Err(ManifestError::Read {
          path: path.to_path_buf(),
          source,
        });
      }
    };
    Self::from_json_str(&content, toolchain).map(Some)
  }

  /// Load the local cache and merge in every remote repository manifest.
  ///
  /// Each remote that can be fetched is snapshotted next to `path` and
  /// accumulated; the accumulator is then merged over the local cache, so
  /// remote entries take precedence. Remote failures are warnings. A local
  /// cache with an unsupported schema is fatal.
  pub async fn load(
    path: &Path,
    urls: &[String],
    toolchain: Toolchain,
    timeout: Duration,
  ) -> Result<Self, ManifestError> {
    let mut accumulator: Option<Self> = None;
    for url in urls {
      match remote::fetch_remote(url, &toolchain, timeout).await {
        Ok(mut fetched) => {
          if let Err(e) = fetched.dump(path, true) {
            warn!(url = %url, error = %e, "could not snapshot remote manifest");
          }
          accumulator
            .get_or_insert_with(|| Self::new(toolchain.clone()))
            .update(&fetched);
        }
        Err(e) => warn!(url = %url, error = %e, "failed to fetch remote manifest"),
      }
    }

    let local = match Self::load_local(path, toolchain.clone())? {
      Some(mut local) => {
        if let Err(e) = local.dump(path, true) {
          warn!(path = %path.display(), error = %e, "could not snapshot local manifest");
        }
        Some(local)
      }
      None => None,
    };

    Ok(Self::merge_remote_state(local, accumulator, toolchain))
  }

  /// Combine a local cache and a remote accumulator; remote entries win.
  pub fn merge_remote_state(local: Option<Self>, remote: Option<Self>, toolchain: Toolchain) -> Self {
    match (local, remote) {
      (Some(mut local), Some(remote)) => {
        local.update(&remote);
        local
      }
      (Some(local), None) => local,
      (None, Some(remote)) => remote,
      (None, None) => Self::new(toolchain),
    }
  }
}
