//! Well-known directories below the install root.
//!
//! ```text
//! {root}/
//! ├── etc/portwright/
//! │   ├── manifest.json     # local manifest cache (+ dated snapshots)
//! │   ├── cache.json        # tool cache
//! │   ├── hosts.json        # host substitution table
//! │   └── locks/            # scoped lock files
//! ├── download/             # fetched archives
//! ├── logs/                 # per-package batch logs
//! └── tmp/                  # package output base
//! ```

use std::path::{Path, PathBuf};

use crate::consts::{APP_NAME, HOSTS_FILENAME, MANIFEST_FILENAME, TOOL_CACHE_FILENAME};

/// Returns the user's home directory, falling back to the working directory.
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the user's home directory, falling back to the working directory.
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("."))
}

/// Default install root when `PORTWRIGHT_ROOT` is unset.
#[cfg(windows)]
pub fn default_root_dir() -> PathBuf {
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
}

/// Default install root when `PORTWRIGHT_ROOT` is unset.
#[cfg(not(windows))]
pub fn default_root_dir() -> PathBuf {
  std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"))
    .join(APP_NAME)
}

/// Directory holding manifests, caches and lock files.
pub fn etc_dir(root: &Path) -> PathBuf {
  root.join("etc").join(APP_NAME)
}

pub fn manifest_path(root: &Path) -> PathBuf {
  etc_dir(root).join(MANIFEST_FILENAME)
}

pub fn tool_cache_path(root: &Path) -> PathBuf {
  etc_dir(root).join(TOOL_CACHE_FILENAME)
}

pub fn hosts_path(root: &Path) -> PathBuf {
  etc_dir(root).join(HOSTS_FILENAME)
}

pub fn lock_dir(root: &Path) -> PathBuf {
  etc_dir(root).join("locks")
}

/// Recipe source descriptions, one `<package>.json` per package.
pub fn recipes_dir(root: &Path) -> PathBuf {
  etc_dir(root).join("recipes")
}

/// File listings of merged packages. Also used inside image directories.
pub fn installed_dir(root: &Path) -> PathBuf {
  etc_dir(root).join("installed")
}

/// Directory searched for bundled tool binaries that are not on `PATH`.
pub fn bundled_bin_dir(root: &Path, os: &str) -> PathBuf {
  root.join("bin").join("data").join("binary").join(os)
}
