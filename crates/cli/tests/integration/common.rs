//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Every variable the binary reads, cleared so the host environment cannot leak in.
const PORTWRIGHT_VARS: &[&str] = &[
  "PORTWRIGHT_ROOT",
  "PORTWRIGHT_OFFLINE",
  "PORTWRIGHT_USE_HARDLINKS",
  "PORTWRIGHT_MANIFEST_URLS",
  "PORTWRIGHT_LOG_DIR",
  "PORTWRIGHT_DOWNLOAD_DIR",
  "PORTWRIGHT_BUILD_DIR",
  "PORTWRIGHT_SVN_USERNAME",
  "PORTWRIGHT_NOTIFY",
  "PORTWRIGHT_CI",
  "PORTWRIGHT_PKGDSTDIR",
  "PORTWRIGHT_UPLOAD_SERVER",
  "PORTWRIGHT_UPLOAD_DIR",
  "PORTWRIGHT_DRIVER",
  "PORTWRIGHT_NETWORK_TIMEOUT",
  "PORTWRIGHT_TOOLCHAIN",
];

pub const TOOLCHAIN: &str = "linux-x86_64-gcc";

/// Isolated test environment.
///
/// Each test gets its own temporary install root.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }

  /// Install root (isolated per test).
  pub fn root_path(&self) -> PathBuf {
    let p = self.temp.path().join("root");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  pub fn manifest_path(&self) -> PathBuf {
    self.root_path().join("etc").join("portwright").join("manifest.json")
  }

  pub fn log_path(&self, package: &str) -> PathBuf {
    self
      .root_path()
      .join("logs")
      .join(format!("log-{}.txt", package.replace('/', "_")))
  }

  /// Get a pre-configured Command for the pw binary.
  ///
  /// Only `PORTWRIGHT_ROOT` and `PORTWRIGHT_TOOLCHAIN` are set; every other
  /// setting is at its default.
  pub fn pw_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("pw");
    for var in PORTWRIGHT_VARS {
      cmd.env_remove(var);
    }
    cmd.env("PORTWRIGHT_ROOT", self.root_path());
    cmd.env("PORTWRIGHT_TOOLCHAIN", TOOLCHAIN);
    cmd
  }
}
