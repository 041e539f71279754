//! Stage execution.
//!
//! The orchestrator only decides which stage runs next; how a stage runs is
//! behind [`StageExecutor`]. [`DriverExecutor`] runs every stage through the
//! external stage driver program, appending its output to the package log.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::types::{PackageDescriptor, Stage};
use crate::config::{ENV_IMAGEDIR, ENV_PKGDSTDIR, ENV_WORKDIR, Settings};
use crate::process::LoggedCommand;

/// Uploader program; reads `cd`, `mput` and `quit` commands on stdin.
pub const DEFAULT_UPLOADER: &str = "psftp";

/// One stage of one package.
#[derive(Debug, Clone, Copy)]
pub struct StageJob<'a> {
  pub package: &'a PackageDescriptor,
  pub stage: Stage,
  pub log: &'a Path,
}

#[async_trait]
pub trait StageExecutor: Send + Sync {
  /// Run the stage. `true` on success.
  async fn execute(&self, job: &StageJob<'_>) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
  pub server: String,
  pub dir: String,
}

#[derive(Debug, Clone)]
pub struct DriverExecutor {
  driver: PathBuf,
  pkg_dst_base: PathBuf,
  build_dir: Option<PathBuf>,
  upload: Option<UploadTarget>,
  uploader: PathBuf,
}

impl DriverExecutor {
  pub fn new(driver: impl Into<PathBuf>, pkg_dst_base: impl Into<PathBuf>) -> Self {
    Self {
      driver: driver.into(),
      pkg_dst_base: pkg_dst_base.into(),
      build_dir: None,
      upload: None,
      uploader: PathBuf::from(DEFAULT_UPLOADER),
    }
  }

  pub fn from_settings(settings: &Settings) -> Self {
    let executor = Self::new(&settings.driver, &settings.pkg_dst_dir).with_build_dir(&settings.build_dir);
    match (&settings.upload_server, &settings.upload_dir) {
      (Some(server), Some(dir)) => executor.with_upload(UploadTarget {
        server: server.clone(),
        dir: dir.clone(),
      }),
      _ => executor,
    }
  }

  pub fn with_upload(mut self, upload: UploadTarget) -> Self {
    self.upload = Some(upload);
    self
  }

  /// Export each package's work and image directories below `build_dir`.
  pub fn with_build_dir(mut self, build_dir: impl Into<PathBuf>) -> Self {
    self.build_dir = Some(build_dir.into());
    self
  }

  pub fn with_uploader(mut self, uploader: impl Into<PathBuf>) -> Self {
    self.uploader = uploader.into();
    self
  }

  /// Output directory of a package's packaging stage.
  pub fn package_dir(&self, package: &PackageDescriptor) -> PathBuf {
    self.pkg_dst_base.join(package.file_stem())
  }

  /// `<driver> --<stage> [extra] [--target=T] <package>`.
  pub fn command(&self, job: &StageJob<'_>) -> LoggedCommand {
    let mut command = LoggedCommand::new(&self.driver).arg(format!("--{}", job.stage));
    match job.stage {
      Stage::Compile => command = command.arg("-i"),
      Stage::Package => {
        command = command
          .arg(format!("--patchlevel={}", job.package.patch_level))
          .env(ENV_PKGDSTDIR, self.package_dir(job.package));
      }
      _ => {}
    }
    if let Some(build_dir) = &self.build_dir {
      command = command
        .env(ENV_WORKDIR, job.package.work_dir(build_dir))
        .env(ENV_IMAGEDIR, job.package.image_dir(build_dir));
    }
    if let Some(target) = &job.package.target {
      command = command.arg(format!("--target={}", target));
    }
    command.arg(&job.package.name).log(Some(job.log))
  }

  async fn upload(&self, job: &StageJob<'_>) -> bool {
    let dir = self.package_dir(job.package);
    let target = match &self.upload {
      Some(target) if dir.is_dir() => target,
      _ => {
        info!(package = %job.package.name, "nothing to upload");
        append_log(
          job.log,
          &format!(
            "Package directory doesn't exist or upload server and directory are not set:\nPackage directory is {}\n",
            dir.display()
          ),
        );
        return true;
      }
    };

    let files = match regular_files(&dir) {
      Ok(files) => files,
      Err(e) => {
        warn!(path = %dir.display(), error = %e, "failed to list package directory");
        return false;
      }
    };

    let script = format!("cd {}\r\nmput {}\r\nquit\r\n", target.dir, files.join(" "));
    append_log(job.log, &script);

    LoggedCommand::new(&self.uploader)
      .arg(&target.server)
      .current_dir(&dir)
      .stdin(script)
      .log(Some(job.log))
      .succeeds()
      .await
  }
}

#[async_trait]
impl StageExecutor for DriverExecutor {
  async fn execute(&self, job: &StageJob<'_>) -> bool {
    match job.stage {
      Stage::Upload => self.upload(job).await,
      Stage::Package => {
        let dir = self.package_dir(job.package);
        if let Err(e) = std::fs::create_dir_all(&dir) {
          warn!(path = %dir.display(), error = %e, "failed to create package directory");
          return false;
        }
        self.command(job).succeeds().await
      }
      _ => self.command(job).succeeds().await,
    }
  }
}

/// Sorted names of the regular files directly inside `dir`.
fn regular_files(dir: &Path) -> std::io::Result<Vec<String>> {
  let mut files = Vec::new();
  for entry in std::fs::read_dir(dir)? {
    let entry = entry?;
    if entry.file_type()?.is_file() {
      files.push(entry.file_name().to_string_lossy().into_owned());
    }
  }
  files.sort();
  Ok(files)
}

pub(crate) fn append_log(path: &Path, text: &str) {
  let result = OpenOptions::new()
    .create(true)
    .append(true)
    .open(path)
    .and_then(|mut file| file.write_all(text.as_bytes()));
  if let Err(e) = result {
    debug!(path = %path.display(), error = %e, "failed to append to log");
  }
}
