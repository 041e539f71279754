//! Best-effort user notifications.
//!
//! Every notification is logged as a step. It is additionally fanned out to
//! the configured backends unless running under continuous integration.
//! Backend failures are logged and otherwise ignored.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, error, info, warn};

/// File the `log` backend appends to, inside the log directory.
pub const NOTIFICATION_LOG: &str = "notifications.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertClass {
  Info,
  Error,
}

impl AlertClass {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Info => "info",
      Self::Error => "error",
    }
  }
}

impl fmt::Display for AlertClass {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Error)]
pub enum NotifyError {
  #[error("unknown notification backend: {0}")]
  UnknownBackend(String),

  #[error("notification backend {backend} failed: {source}")]
  Io {
    backend: String,
    #[source]
    source: std::io::Error,
  },

  #[error("notification command {program} exited with {code:?}")]
  CommandFailed { program: String, code: Option<i32> },
}

/// A named notification sink.
pub trait Notifier: Send + Sync {
  fn name(&self) -> &str;

  fn notify(&self, title: &str, message: &str, class: AlertClass) -> Result<(), NotifyError>;
}

/// Appends notifications to a file.
#[derive(Debug)]
pub struct LogNotifier {
  path: PathBuf,
}

impl LogNotifier {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

impl Notifier for LogNotifier {
  fn name(&self) -> &str {
    "log"
  }

  fn notify(&self, title: &str, message: &str, class: AlertClass) -> Result<(), NotifyError> {
    let io_err = |source| NotifyError::Io {
      backend: self.name().to_string(),
      source,
    };
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)
      .map_err(io_err)?;
    writeln!(file, "[{}] {}: {}", class, title, message).map_err(io_err)
  }
}

/// Runs `<program> <title> <message>`, e.g. `notify-send`.
#[derive(Debug)]
pub struct CommandNotifier {
  program: String,
}

impl CommandNotifier {
  pub fn new(program: impl Into<String>) -> Self {
    Self { program: program.into() }
  }
}

impl Notifier for CommandNotifier {
  fn name(&self) -> &str {
    &self.program
  }

  fn notify(&self, title: &str, message: &str, _class: AlertClass) -> Result<(), NotifyError> {
    let status = Command::new(&self.program)
      .arg(title)
      .arg(message)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .status()
      .map_err(|source| NotifyError::Io {
        backend: self.program.clone(),
        source,
      })?;

    if status.success() {
      Ok(())
    } else {
      Err(NotifyError::CommandFailed {
        program: self.program.clone(),
        code: status.code(),
      })
    }
  }
}

/// The set of configured backends.
pub struct Notifications {
  backends: Vec<Box<dyn Notifier>>,
  ci: bool,
}

impl fmt::Debug for Notifications {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Notifications")
      .field("backends", &self.backends.iter().map(|b| b.name()).collect::<Vec<_>>())
      .field("ci", &self.ci)
      .finish()
  }
}

impl Notifications {
  pub fn new(backends: Vec<Box<dyn Notifier>>, ci: bool) -> Self {
    Self { backends, ci }
  }

  /// Only the step log, no backends.
  pub fn disabled() -> Self {
    Self::new(Vec::new(), false)
  }

  /// Build backends from names: `log` or `command:<program>`.
  pub fn from_names(names: &[String], log_dir: &std::path::Path, ci: bool) -> Result<Self, NotifyError> {
    let backends = names
      .iter()
      .map(|name| -> Result<Box<dyn Notifier>, NotifyError> {
        match name.split_once(':') {
          None if name == "log" => Ok(Box::new(LogNotifier::new(log_dir.join(NOTIFICATION_LOG)))),
          Some(("command", program)) if !program.is_empty() => Ok(Box::new(CommandNotifier::new(program))),
          _ => Err(NotifyError::UnknownBackend(name.clone())),
        }
      })
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self::new(backends, ci))
  }

  pub fn backend_names(&self) -> Vec<&str> {
    self.backends.iter().map(|b| b.name()).collect()
  }

  /// Log the step and fan out to the backends.
  pub fn notify(&self, title: &str, message: &str, class: AlertClass) {
    match class {
      AlertClass::Error => error!(title, "{}", message),
      AlertClass::Info => info!(title, "{}", message),
    }

    if self.ci || self.backends.is_empty() {
      debug!(ci = self.ci, "notification backends skipped");
      return;
    }

    for backend in &self.backends {
      if let Err(e) = backend.notify(title, message, class) {
        warn!(backend = backend.name(), error = %e, "notification failed");
      }
    }
  }
}
