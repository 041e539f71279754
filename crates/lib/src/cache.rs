//! Persistent cache of tool lookups and capability checks.
//!
//! Locating programs, probing their flags and scraping nightly version lists
//! are slow, so results are kept in a [`ToolCache`] that is saved as JSON in
//! the etc directory. A cache older than one day, or written by a different
//! cache version, is discarded on load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::consts::{DEFAULT_NETWORK_TIMEOUT_SECS, TOOL_CACHE_TTL_SECS};
use crate::platform::{Os, paths};
use crate::process::capture_output;
use crate::util::fs::write_atomic;

const CACHE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("failed to write tool cache {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to serialize tool cache: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("invalid version pattern {pattern:?}: {source}")]
  Pattern {
    pattern: String,
    #[source]
    source: regex::Error,
  },

  #[error("request to {url} failed: {source}")]
  Http {
    url: String,
    #[source]
    source: reqwest::Error,
  },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CacheData {
  version: u32,
  created_at_unix: u64,
  #[serde(default)]
  app_paths: BTreeMap<String, PathBuf>,
  /// Keyed by `"<app> <flag>"`.
  #[serde(default)]
  capabilities: BTreeMap<String, bool>,
  /// Keyed by the scraped URL.
  #[serde(default)]
  nightly_versions: BTreeMap<String, Vec<String>>,
}

impl CacheData {
  fn fresh() -> Self {
    Self {
      version: CACHE_VERSION,
      created_at_unix: now_unix(),
      ..Default::default()
    }
  }

  fn is_usable(&self, ttl: Duration) -> bool {
    self.version == CACHE_VERSION && now_unix().saturating_sub(self.created_at_unix) < ttl.as_secs()
  }
}

fn now_unix() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}

/// Cached application paths, capability checks and nightly versions.
#[derive(Debug)]
pub struct ToolCache {
  path: Option<PathBuf>,
  root: PathBuf,
  offline: bool,
  timeout: Duration,
  data: Mutex<CacheData>,
}

impl ToolCache {
  /// An empty, unpersisted cache for tools below `root`.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      path: None,
      root: root.into(),
      offline: false,
      timeout: Duration::from_secs(DEFAULT_NETWORK_TIMEOUT_SECS),
      data: Mutex::new(CacheData::fresh()),
    }
  }

  /// A cache configured from settings and loaded from the etc directory.
  pub fn from_settings(settings: &Settings) -> Self {
    Self::new(&settings.root)
      .with_offline(settings.offline)
      .with_timeout(settings.network_timeout)
      .load_from(&settings.tool_cache_path(), Duration::from_secs(TOOL_CACHE_TTL_SECS))
  }

  pub fn with_offline(mut self, offline: bool) -> Self {
    self.offline = offline;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Network timeout for connecting and for each read.
  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  /// Attach a backing file and load it.
  ///
  /// Missing, corrupt, stale or foreign-version files leave the cache empty.
  pub fn load_from(mut self, path: &Path, ttl: Duration) -> Self {
    self.path = Some(path.to_path_buf());

    let Ok(content) = std::fs::read_to_string(path) else {
      debug!(path = %path.display(), "no tool cache");
      return self;
    };

    match serde_json::from_str::<CacheData>(&content) {
      Ok(data) if data.is_usable(ttl) => {
        debug!(path = %path.display(), "tool cache loaded");
        self.data = Mutex::new(data);
      }
      Ok(_) => info!(path = %path.display(), "tool cache expired, starting fresh"),
      Err(e) => warn!(path = %path.display(), error = %e, "tool cache is corrupt, starting fresh"),
    }
    self
  }

  /// Persist to the backing file, if any.
  pub fn save(&self) -> Result<(), CacheError> {
    let Some(path) = &self.path else {
      return Ok(());
    };
    let content = serde_json::to_string_pretty(&*self.data())?;
    write_atomic(path, content.as_bytes()).map_err(|source| CacheError::Write {
      path: path.clone(),
      source,
    })
  }

  fn data(&self) -> MutexGuard<'_, CacheData> {
    self.data.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn is_offline(&self) -> bool {
    self.offline
  }

  /// Locate an application.
  ///
  /// Searches `PATH` first, then the bundled binary directory below the
  /// install root. Only `PATH` hits are cached.
  pub fn find_application(&self, app: &str) -> Option<PathBuf> {
    if let Some(path) = self.data().app_paths.get(app)
      && path.exists()
    {
      return Some(path.clone());
    }

    if let Ok(path) = which::which(app) {
      debug!(app, path = %path.display(), "found on PATH");
      self.data().app_paths.insert(app.to_string(), path.clone());
      return Some(path);
    }

    let os = Os::current()?;
    let dir = paths::bundled_bin_dir(&self.root, os.as_str());
    let found = os
      .executable_suffixes()
      .iter()
      .map(|suffix| dir.join(format!("{}{}", app, suffix)))
      .find(|candidate| candidate.is_file());

    if found.is_none() {
      debug!(app, "application not found");
    }
    found
  }

  /// Whether `app help_arg` mentions `flag`. Cached per (app, flag).
  pub async fn supports_flag(&self, app: &str, flag: &str, help_arg: &str) -> bool {
    let key = format!("{} {}", app, flag);
    if let Some(&supported) = self.data().capabilities.get(&key) {
      return supported;
    }

    let Some(program) = self.find_application(app) else {
      return false;
    };

    let supported = match capture_output(&program, &[help_arg], self.timeout).await {
      Ok(output) => output.contains(flag),
      Err(e) => {
        warn!(app, error = %e, "capability check failed");
        return false;
      }
    };

    debug!(app, flag, supported, "capability checked");
    self.data().capabilities.insert(key, supported);
    supported
  }

  /// Versions listed at `url`, extracted with `pattern`.
  ///
  /// When the pattern has a capture group the first group is used, otherwise
  /// the whole match. Duplicates are dropped, first occurrence kept. Offline
  /// mode and any failure yield an empty list.
  pub async fn nightly_versions(&self, url: &str, pattern: &str) -> Vec<String> {
    if self.offline {
      debug!(url, "offline, skipping nightly version lookup");
      return Vec::new();
    }

    if let Some(versions) = self.data().nightly_versions.get(url) {
      return versions.clone();
    }

    match self.scrape_versions(url, pattern).await {
      Ok(versions) => {
        self
          .data()
          .nightly_versions
          .insert(url.to_string(), versions.clone());
        versions
      }
      Err(e) => {
        warn!(url, error = %e, "nightly version lookup failed");
        Vec::new()
      }
    }
  }

  async fn scrape_versions(&self, url: &str, pattern: &str) -> Result<Vec<String>, CacheError> {
    let regex = Regex::new(pattern).map_err(|source| CacheError::Pattern {
      pattern: pattern.to_string(),
      source,
    })?;
    let http_err = |source| CacheError::Http {
      url: url.to_string(),
      source,
    };

    let client = reqwest::Client::builder()
      .timeout(self.timeout)
      .build()
      .map_err(http_err)?;
    let body = client
      .get(url)
      .send()
      .await
      .and_then(reqwest::Response::error_for_status)
      .map_err(http_err)?
      .text()
      .await
      .map_err(http_err)?;

    let mut versions: Vec<String> = Vec::new();
    for caps in regex.captures_iter(&body) {
      let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
        continue;
      };
      let version = m.as_str().to_string();
      if !versions.contains(&version) {
        versions.push(version);
      }
    }
    Ok(versions)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  const DAY: Duration = Duration::from_secs(TOOL_CACHE_TTL_SECS);

  #[test]
  fn save_and_reload() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("cache.json");

    let cache = ToolCache::new(temp.path()).load_from(&path, DAY);
    cache
      .data()
      .capabilities
      .insert("7za -bs".to_string(), true);
    cache.save().unwrap();

    let reloaded = ToolCache::new(temp.path()).load_from(&path, DAY);
    assert_eq!(reloaded.data().capabilities.get("7za -bs"), Some(&true));
  }

  #[test]
  fn stale_cache_is_discarded() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("cache.json");
    let stale = CacheData {
      version: CACHE_VERSION,
      created_at_unix: now_unix() - TOOL_CACHE_TTL_SECS - 60,
      capabilities: BTreeMap::from([("git --foo".to_string(), true)]),
      ..Default::default()
    };
    std::fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

    let cache = ToolCache::new(temp.path()).load_from(&path, DAY);
    assert!(cache.data().capabilities.is_empty());
  }

  #[test]
  fn foreign_version_is_discarded() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("cache.json");
    let foreign = CacheData {
      version: CACHE_VERSION + 1,
      created_at_unix: now_unix(),
      capabilities: BTreeMap::from([("git --foo".to_string(), true)]),
      ..Default::default()
    };
    std::fs::write(&path, serde_json::to_string(&foreign).unwrap()).unwrap();

    let cache = ToolCache::new(temp.path()).load_from(&path, DAY);
    assert!(cache.data().capabilities.is_empty());
  }

  #[test]
  fn corrupt_cache_starts_fresh() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("cache.json");
    std::fs::write(&path, "{{{").unwrap();

    let cache = ToolCache::new(temp.path()).load_from(&path, DAY);
    assert_eq!(cache.data().version, CACHE_VERSION);
  }

  #[cfg(unix)]
  #[test]
  fn finds_bundled_binary_without_caching() {
    use crate::util::testutil::write_script;

    let temp = tempdir().unwrap();
    let os = Os::current().unwrap();
    let dir = paths::bundled_bin_dir(temp.path(), os.as_str());
    std::fs::create_dir_all(&dir).unwrap();
    let tool = write_script(&dir, "portwright-bundled-tool", "exit 0");

    let cache = ToolCache::new(temp.path());
    assert_eq!(cache.find_application("portwright-bundled-tool"), Some(tool));
    assert!(cache.data().app_paths.is_empty());
    assert_eq!(cache.find_application("portwright-no-such-tool"), None);
  }

  #[cfg(unix)]
  #[test]
  fn path_hits_are_cached() {
    let temp = tempdir().unwrap();
    let cache = ToolCache::new(temp.path());
    let sh = cache.find_application("sh").unwrap();
    assert_eq!(cache.data().app_paths.get("sh"), Some(&sh));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn checks_flag_support_once() {
    use crate::util::testutil::write_script;

    let temp = tempdir().unwrap();
    let os = Os::current().unwrap();
    let dir = paths::bundled_bin_dir(temp.path(), os.as_str());
    std::fs::create_dir_all(&dir).unwrap();
    write_script(&dir, "portwright-help-tool", "echo 'usage: -bs -y -r'; exit 7");

    let cache = ToolCache::new(temp.path());
    assert!(cache.supports_flag("portwright-help-tool", "-bs", "--help").await);
    assert!(!cache.supports_flag("portwright-help-tool", "-zz", "--help").await);
    assert_eq!(cache.data().capabilities.get("portwright-help-tool -bs"), Some(&true));
    assert!(!cache.supports_flag("portwright-missing-tool", "-bs", "--help").await);
  }

  #[tokio::test]
  async fn nightly_versions_are_scraped_and_deduplicated() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("GET", "/nightly/")
      .with_status(200)
      .with_body(r#"<a href="pkg-20240101.tar.xz">x</a> <a href="pkg-20240102.tar.xz">y</a> pkg-20240101.tar.xz"#)
      .expect(1)
      .create_async()
      .await;

    let url = format!("{}/nightly/", server.url());
    let cache = ToolCache::new("/unused");
    let versions = cache.nightly_versions(&url, r"pkg-(\d+)\.tar\.xz").await;
    assert_eq!(versions, ["20240101", "20240102"]);

    // second call is served from the cache
    assert_eq!(cache.nightly_versions(&url, r"pkg-(\d+)\.tar\.xz").await, versions);
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn nightly_versions_degrade_to_empty() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server.mock("GET", "/gone").with_status(404).create_async().await;

    let cache = ToolCache::new("/unused");
    assert!(cache.nightly_versions(&format!("{}/gone", server.url()), r"\d+").await.is_empty());

    let offline = ToolCache::new("/unused").with_offline(true);
    assert!(offline.nightly_versions(&server.url(), r"\d+").await.is_empty());
  }
}
