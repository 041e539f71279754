//! Stages, package state, and batch results.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use crate::consts::LOG_TAIL_LINES;

/// One step of the per-package pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
  Fetch,
  Unpack,
  Compile,
  Install,
  Manifest,
  Qmerge,
  Test,
  Package,
  Upload,
}

impl Stage {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Fetch => "fetch",
      Self::Unpack => "unpack",
      Self::Compile => "compile",
      Self::Install => "install",
      Self::Manifest => "manifest",
      Self::Qmerge => "qmerge",
      Self::Test => "test",
      Self::Package => "package",
      Self::Upload => "upload",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A pass over the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sweep {
  Fetch,
  Build,
  Test,
  Package,
  Upload,
}

impl Sweep {
  /// Stages run for each package during this sweep, in order.
  pub fn stages(self) -> &'static [Stage] {
    match self {
      Self::Fetch => &[Stage::Fetch],
      Self::Build => &[Stage::Unpack, Stage::Compile, Stage::Install, Stage::Manifest, Stage::Qmerge],
      Self::Test => &[Stage::Test],
      Self::Package => &[Stage::Package],
      Self::Upload => &[Stage::Upload],
    }
  }

  /// Sweeps of a batch run, in order.
  pub fn plan(with_tests: bool) -> Vec<Sweep> {
    let mut sweeps = vec![Self::Fetch, Self::Build];
    if with_tests {
      sweeps.push(Self::Test);
    }
    sweeps.extend([Self::Package, Self::Upload]);
    sweeps
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
  Pending,
  Running(Stage),
  Done,
  Failed(Stage),
}

impl PackageState {
  pub fn is_enabled(self) -> bool {
    !matches!(self, Self::Failed(_))
  }
}

/// One line of a package list: what to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
  pub name: String,
  pub target: Option<String>,
  pub patch_level: String,
}

impl PackageDescriptor {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      target: None,
      patch_level: String::new(),
    }
  }

  pub fn with_target(mut self, target: impl Into<String>) -> Self {
    self.target = Some(target.into());
    self
  }

  pub fn with_patch_level(mut self, patch_level: impl Into<String>) -> Self {
    self.patch_level = patch_level.into();
    self
  }

  /// The name with path separators replaced, usable as a file name.
  pub fn file_stem(&self) -> String {
    self.name.replace('/', "_")
  }

  /// Log file of this package within `log_dir`.
  pub fn log_path(&self, log_dir: &Path) -> PathBuf {
    log_dir.join(format!("log-{}.txt", self.file_stem()))
  }

  /// Where the package's sources are unpacked.
  pub fn work_dir(&self, build_dir: &Path) -> PathBuf {
    build_dir.join(self.file_stem()).join("work")
  }

  /// Where the install stage puts the files that qmerge copies into the root.
  pub fn image_dir(&self, build_dir: &Path) -> PathBuf {
    build_dir.join(self.file_stem()).join("image")
  }
}

/// A stage failure of one package.
#[derive(Debug, Clone, Error)]
#[error("{package} {stage} FAILED")]
pub struct BuildError {
  pub package: String,
  pub stage: Stage,
  pub message: String,
  pub log_path: PathBuf,
}

impl BuildError {
  pub fn new(package: &str, stage: Stage, log_path: &Path) -> Self {
    Self {
      package: package.to_string(),
      stage,
      message: format!("{} {} FAILED", package, stage),
      log_path: log_path.to_path_buf(),
    }
  }

  /// The user-facing summary: `Error:` followed by the end of the log.
  pub fn summary(&self) -> String {
    format!("Error:{}", log_tail(&self.log_path, LOG_TAIL_LINES))
  }
}

/// The last `lines` lines of a file, newline terminated. Unreadable is empty.
pub fn log_tail(path: &Path, lines: usize) -> String {
  let Ok(file) = File::open(path) else {
    return String::new();
  };
  let all: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
  let start = all.len().saturating_sub(lines);
  all[start..].iter().map(|l| format!("{}\n", l)).collect()
}

/// Final state of one package after a batch.
#[derive(Debug, Clone)]
pub struct PackageOutcome {
  pub package: PackageDescriptor,
  pub state: PackageState,
  pub error: Option<BuildError>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
  pub packages: Vec<PackageOutcome>,
}

impl BatchReport {
  pub fn has_failures(&self) -> bool {
    self.packages.iter().any(|p| p.error.is_some())
  }

  pub fn errors(&self) -> impl Iterator<Item = &BuildError> {
    self.packages.iter().filter_map(|p| p.error.as_ref())
  }

  pub fn state_of(&self, name: &str) -> Option<PackageState> {
    self.packages.iter().find(|p| p.package.name == name).map(|p| p.state)
  }
}

/// Errors that abort a batch before any package runs.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("failed to prepare log {path}: {source}")]
  Log {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}
