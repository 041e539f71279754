//! External process execution.
//!
//! Every backend and pipeline step is an external program. Success is a zero
//! exit status; a non-zero exit is reported as `Ok(false)`, not an error.
//! When a log file is attached, stdout and stderr are both appended to it.

use std::ffi::{OsStr, OsString};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ProcessError {
  #[error("failed to spawn {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to open log file {path}: {source}")]
  OpenLog {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to feed stdin of {program}: {source}")]
  Stdin {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed waiting for {program}: {source}")]
  Wait {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("{program} timed out after {secs}s")]
  Timeout { program: String, secs: u64 },
}

/// Builder for a process whose output goes to a log file.
#[derive(Debug, Clone)]
pub struct LoggedCommand {
  program: OsString,
  args: Vec<OsString>,
  cwd: Option<PathBuf>,
  env: Vec<(OsString, OsString)>,
  stdin: Option<String>,
  log: Option<PathBuf>,
}

impl LoggedCommand {
  pub fn new(program: impl AsRef<OsStr>) -> Self {
    Self {
      program: program.as_ref().to_os_string(),
      args: Vec::new(),
      cwd: None,
      env: Vec::new(),
      stdin: None,
      log: None,
    }
  }

  pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
    self.args.push(arg.as_ref().to_os_string());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
    self
  }

  pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cwd = Some(dir.into());
    self
  }

  pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
    self
      .env
      .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
    self
  }

  /// Text written to the process's stdin, which is then closed.
  pub fn stdin(mut self, input: impl Into<String>) -> Self {
    self.stdin = Some(input.into());
    self
  }

  /// Append combined output to this file instead of the tracing log.
  pub fn log(mut self, path: Option<&Path>) -> Self {
    self.log = path.map(Path::to_path_buf);
    self
  }

  pub fn program(&self) -> &OsStr {
    &self.program
  }

  pub fn arguments(&self) -> &[OsString] {
    &self.args
  }

  pub fn working_dir(&self) -> Option<&Path> {
    self.cwd.as_deref()
  }

  /// Command line as a single display string.
  pub fn display(&self) -> String {
    std::iter::once(&self.program)
      .chain(&self.args)
      .map(|s| s.to_string_lossy())
      .collect::<Vec<_>>()
      .join(" ")
  }

  fn program_name(&self) -> String {
    self.program.to_string_lossy().into_owned()
  }

  fn open_log(&self, path: &Path) -> Result<File, ProcessError> {
    let open_err = |source| ProcessError::OpenLog {
      path: path.to_path_buf(),
      source,
    };
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(open_err)?;
    }
    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(path)
      .map_err(open_err)?;
    writeln!(file, "$ {}", self.display()).map_err(open_err)?;
    Ok(file)
  }

  /// Run to completion. `Ok(true)` on zero exit status.
  pub async fn run(&self) -> Result<bool, ProcessError> {
    info!(cmd = %self.display(), cwd = ?self.cwd, "running");

    let mut command = Command::new(&self.program);
    command.args(&self.args);
    if let Some(cwd) = &self.cwd {
      command.current_dir(cwd);
    }
    for (key, value) in &self.env {
      command.env(key, value);
    }
    command.stdin(if self.stdin.is_some() {
      Stdio::piped()
    } else {
      Stdio::null()
    });

    let log_file = match &self.log {
      Some(path) => Some(self.open_log(path)?),
      None => None,
    };
    match &log_file {
      Some(file) => {
        let open_err = |source| ProcessError::OpenLog {
          path: self.log.clone().unwrap_or_default(),
          source,
        };
        command.stdout(Stdio::from(file.try_clone().map_err(open_err)?));
        command.stderr(Stdio::from(file.try_clone().map_err(open_err)?));
      }
      None => {
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
      }
    }

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
      program: self.program_name(),
      source,
    })?;

    if let Some(input) = &self.stdin
      && let Some(mut pipe) = child.stdin.take()
    {
      let stdin_err = |source| ProcessError::Stdin {
        program: self.program_name(),
        source,
      };
      pipe.write_all(input.as_bytes()).await.map_err(stdin_err)?;
      pipe.shutdown().await.map_err(stdin_err)?;
    }

    let output = child.wait_with_output().await.map_err(|source| ProcessError::Wait {
      program: self.program_name(),
      source,
    })?;

    if log_file.is_none() {
      let stdout = String::from_utf8_lossy(&output.stdout);
      let stderr = String::from_utf8_lossy(&output.stderr);
      if !stdout.trim().is_empty() {
        debug!(stdout = %stdout.trim_end(), "command stdout");
      }
      if !stderr.trim().is_empty() {
        debug!(stderr = %stderr.trim_end(), "command stderr");
      }
    }

    if !output.status.success() {
      debug!(cmd = %self.display(), code = ?output.status.code(), "command failed");
    }
    Ok(output.status.success())
  }

  /// Run and collapse every failure into `false`.
  pub async fn succeeds(&self) -> bool {
    match self.run().await {
      Ok(success) => success,
      Err(e) => {
        warn!(cmd = %self.display(), error = %e, "command could not run");
        false
      }
    }
  }
}

/// Run a short check command and return its combined stdout and stderr.
///
/// The exit status is ignored: help output is often printed with a non-zero
/// status.
pub async fn capture_output(program: &Path, args: &[&str], timeout: Duration) -> Result<String, ProcessError> {
  let program_name = program.display().to_string();
  let mut command = Command::new(program);
  command.args(args).stdin(Stdio::null()).kill_on_drop(true);

  let output = tokio::time::timeout(timeout, command.output())
    .await
    .map_err(|_| ProcessError::Timeout {
      program: program_name.clone(),
      secs: timeout.as_secs(),
    })?
    .map_err(|source| ProcessError::Spawn {
      program: program_name,
      source,
    })?;

  let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
  text.push_str(&String::from_utf8_lossy(&output.stderr));
  Ok(text)
}
