use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use portwright_lib::notify::{AlertClass, Notifier, NotifyError};
use portwright_lib::pipeline::{Stage, StageExecutor, StageJob};

pub type Visits = Arc<Mutex<Vec<(String, Stage)>>>;

/// Executor that records every stage it is asked to run and fails the
/// configured (package, stage) pairs.
pub struct RecordingExecutor {
  failures: HashSet<(String, Stage)>,
  pub visits: Visits,
}

impl RecordingExecutor {
  pub fn failing(failures: &[(&str, Stage)]) -> Self {
    Self {
      failures: failures.iter().map(|(n, s)| (n.to_string(), *s)).collect(),
      visits: Visits::default(),
    }
  }
}

#[async_trait]
impl StageExecutor for RecordingExecutor {
  async fn execute(&self, job: &StageJob<'_>) -> bool {
    let failed = self.failures.contains(&(job.package.name.clone(), job.stage));
    let mut log = OpenOptions::new().append(true).open(job.log).unwrap();
    writeln!(log, "running {} for {}", job.stage, job.package.name).unwrap();
    if failed {
      writeln!(log, "error: {} broke", job.stage).unwrap();
    }
    self.visits.lock().unwrap().push((job.package.name.clone(), job.stage));
    !failed
  }
}

pub type Sent = Arc<Mutex<Vec<(String, String, AlertClass)>>>;

pub struct RecordingNotifier(pub Sent);

impl Notifier for RecordingNotifier {
  fn name(&self) -> &str {
    "recording"
  }

  fn notify(&self, title: &str, message: &str, class: AlertClass) -> Result<(), NotifyError> {
    self.0.lock().unwrap().push((title.to_string(), message.to_string(), class));
    Ok(())
  }
}

pub fn write_file(path: &Path, content: &str) {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, content).unwrap();
}
