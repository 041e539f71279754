//! Environment-driven settings.
//!
//! Every toggle is read from a `PORTWRIGHT_*` environment variable. Unset
//! variables fall back to defaults derived from the install root; malformed
//! values are fatal.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::consts::DEFAULT_NETWORK_TIMEOUT_SECS;
use crate::platform::Toolchain;
use crate::platform::paths;

pub const ENV_ROOT: &str = "PORTWRIGHT_ROOT";
pub const ENV_OFFLINE: &str = "PORTWRIGHT_OFFLINE";
pub const ENV_USE_HARDLINKS: &str = "PORTWRIGHT_USE_HARDLINKS";
pub const ENV_MANIFEST_URLS: &str = "PORTWRIGHT_MANIFEST_URLS";
pub const ENV_LOG_DIR: &str = "PORTWRIGHT_LOG_DIR";
pub const ENV_DOWNLOAD_DIR: &str = "PORTWRIGHT_DOWNLOAD_DIR";
pub const ENV_BUILD_DIR: &str = "PORTWRIGHT_BUILD_DIR";
pub const ENV_SVN_USERNAME: &str = "PORTWRIGHT_SVN_USERNAME";
pub const ENV_NOTIFY: &str = "PORTWRIGHT_NOTIFY";
pub const ENV_CI: &str = "PORTWRIGHT_CI";
pub const ENV_PKGDSTDIR: &str = "PORTWRIGHT_PKGDSTDIR";
pub const ENV_UPLOAD_SERVER: &str = "PORTWRIGHT_UPLOAD_SERVER";
pub const ENV_UPLOAD_DIR: &str = "PORTWRIGHT_UPLOAD_DIR";
pub const ENV_DRIVER: &str = "PORTWRIGHT_DRIVER";
pub const ENV_NETWORK_TIMEOUT: &str = "PORTWRIGHT_NETWORK_TIMEOUT";
pub const ENV_TOOLCHAIN: &str = "PORTWRIGHT_TOOLCHAIN";

/// Exported to the driver: where a package's sources are unpacked.
pub const ENV_WORKDIR: &str = "PORTWRIGHT_WORKDIR";
/// Exported to the driver: where the install stage must put its files.
pub const ENV_IMAGEDIR: &str = "PORTWRIGHT_IMAGEDIR";

/// Default per-stage driver program.
pub const DEFAULT_DRIVER: &str = "emerge";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("invalid boolean in {var}: {value:?} (expected 1/0, true/false, yes/no, on/off)")]
  InvalidBool { var: &'static str, value: String },

  #[error("invalid integer in {var}: {value:?}")]
  InvalidInteger { var: &'static str, value: String },

  #[error("{var} is not valid unicode")]
  NotUnicode { var: &'static str },
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
  pub root: PathBuf,
  pub offline: bool,
  pub use_hardlinks: bool,
  pub manifest_urls: Vec<String>,
  pub log_dir: PathBuf,
  pub download_dir: PathBuf,
  pub build_dir: PathBuf,
  pub svn_username: Option<String>,
  pub notify: Vec<String>,
  pub ci: bool,
  pub pkg_dst_dir: PathBuf,
  pub upload_server: Option<String>,
  pub upload_dir: Option<String>,
  pub driver: String,
  pub network_timeout: Duration,
  pub toolchain: Toolchain,
}

impl Settings {
  /// Defaults for an install root, ignoring the environment.
  pub fn with_root(root: impl Into<PathBuf>) -> Self {
    let root = root.into();
    Self {
      log_dir: root.join("logs"),
      download_dir: root.join("download"),
      build_dir: root.join("build"),
      pkg_dst_dir: root.join("tmp"),
      root,
      offline: false,
      use_hardlinks: false,
      manifest_urls: Vec::new(),
      svn_username: None,
      notify: Vec::new(),
      ci: false,
      upload_server: None,
      upload_dir: None,
      driver: DEFAULT_DRIVER.to_string(),
      network_timeout: Duration::from_secs(DEFAULT_NETWORK_TIMEOUT_SECS),
      toolchain: Toolchain::host(),
    }
  }

  /// Read settings from the `PORTWRIGHT_*` environment.
  pub fn from_env() -> Result<Self, ConfigError> {
    let root = read_var(ENV_ROOT)?
      .map(PathBuf::from)
      .unwrap_or_else(paths::default_root_dir);
    let mut settings = Self::with_root(root);

    settings.offline = read_bool(ENV_OFFLINE)?.unwrap_or(false);
    settings.use_hardlinks = read_bool(ENV_USE_HARDLINKS)?.unwrap_or(false);
    settings.ci = read_bool(ENV_CI)?.unwrap_or(false);
    settings.manifest_urls = read_var(ENV_MANIFEST_URLS)?
      .map(|v| split_list(&v, &[';', ',']))
      .unwrap_or_default();
    settings.notify = read_var(ENV_NOTIFY)?
      .map(|v| split_list(&v, &[';']))
      .unwrap_or_default();

    if let Some(dir) = read_var(ENV_LOG_DIR)? {
      settings.log_dir = PathBuf::from(dir);
    }
    if let Some(dir) = read_var(ENV_DOWNLOAD_DIR)? {
      settings.download_dir = PathBuf::from(dir);
    }
    if let Some(dir) = read_var(ENV_BUILD_DIR)? {
      settings.build_dir = PathBuf::from(dir);
    }
    if let Some(dir) = read_var(ENV_PKGDSTDIR)? {
      settings.pkg_dst_dir = PathBuf::from(dir);
    }
    if let Some(driver) = read_var(ENV_DRIVER)? {
      settings.driver = driver;
    }
    if let Some(toolchain) = read_var(ENV_TOOLCHAIN)? {
      settings.toolchain = Toolchain::new(toolchain);
    }
    if let Some(secs) = read_var(ENV_NETWORK_TIMEOUT)? {
      let secs = secs.trim().parse::<u64>().map_err(|_| ConfigError::InvalidInteger {
        var: ENV_NETWORK_TIMEOUT,
        value: secs.clone(),
      })?;
      settings.network_timeout = Duration::from_secs(secs);
    }

    settings.svn_username = read_var(ENV_SVN_USERNAME)?;
    settings.upload_server = read_var(ENV_UPLOAD_SERVER)?;
    settings.upload_dir = read_var(ENV_UPLOAD_DIR)?;

    Ok(settings)
  }

  pub fn manifest_path(&self) -> PathBuf {
    paths::manifest_path(&self.root)
  }

  pub fn tool_cache_path(&self) -> PathBuf {
    paths::tool_cache_path(&self.root)
  }

  pub fn hosts_path(&self) -> PathBuf {
    paths::hosts_path(&self.root)
  }

  pub fn lock_dir(&self) -> PathBuf {
    paths::lock_dir(&self.root)
  }

  pub fn recipes_dir(&self) -> PathBuf {
    paths::recipes_dir(&self.root)
  }

  /// Checkouts of version controlled sources.
  pub fn checkout_dir(&self) -> PathBuf {
    self.root.join("src")
  }
}

/// Read a variable, treating unset and empty the same.
fn read_var(var: &'static str) -> Result<Option<String>, ConfigError> {
  match std::env::var(var) {
    Ok(value) if value.trim().is_empty() => Ok(None),
    Ok(value) => Ok(Some(value)),
    Err(std::env::VarError::NotPresent) => Ok(None),
    Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode { var }),
  }
}

fn read_bool(var: &'static str) -> Result<Option<bool>, ConfigError> {
  let Some(value) = read_var(var)? else {
    return Ok(None);
  };
  match value.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(Some(true)),
    "0" | "false" | "no" | "off" => Ok(Some(false)),
    _ => Err(ConfigError::InvalidBool { var, value }),
  }
}

fn split_list(value: &str, separators: &[char]) -> Vec<String> {
  value
    .split(separators)
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(String::from)
    .collect()
}
