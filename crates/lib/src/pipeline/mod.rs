//! Batch orchestration.
//!
//! A batch runs in sweeps: every package is fetched before any is built,
//! every package is built before any is packaged, and so on. A package that
//! fails a stage is disabled for the rest of the batch while the others carry
//! on. Each failure is recorded as a [`BuildError`] and sent as a
//! notification carrying the end of the package log.

pub mod engine;
pub mod executor;
pub mod package_list;
pub mod types;

use std::fs::File;
use std::path::PathBuf;

use tracing::{debug, error, info};

use crate::notify::{AlertClass, Notifications};
use crate::platform::Toolchain;

pub use engine::EngineExecutor;
pub use executor::{DriverExecutor, StageExecutor, StageJob, UploadTarget};
pub use package_list::PackageListError;
pub use types::{
  BatchReport, BuildError, LOG_TAIL_LINES, PackageDescriptor, PackageOutcome, PackageState, PipelineError, Stage,
  Sweep,
};

/// Per-package state for the duration of a batch.
struct PackageRun {
  package: PackageDescriptor,
  log: PathBuf,
  state: PackageState,
  error: Option<BuildError>,
}

pub struct Orchestrator<E> {
  executor: E,
  notifications: Notifications,
  log_dir: PathBuf,
  toolchain: Toolchain,
  run_tests: bool,
}

impl<E: StageExecutor> Orchestrator<E> {
  pub fn new(executor: E, notifications: Notifications, log_dir: impl Into<PathBuf>, toolchain: Toolchain) -> Self {
    Self {
      executor,
      notifications,
      log_dir: log_dir.into(),
      toolchain,
      run_tests: false,
    }
  }

  /// Add the test sweep between build and package.
  pub fn with_tests(mut self, run_tests: bool) -> Self {
    self.run_tests = run_tests;
    self
  }

  pub fn executor(&self) -> &E {
    &self.executor
  }

  /// Run every sweep over the batch, in order.
  ///
  /// Only failing to prepare the log files aborts the batch; stage failures
  /// end up in the report.
  pub async fn run(&self, packages: Vec<PackageDescriptor>) -> Result<BatchReport, PipelineError> {
    info!(packages = packages.len(), tests = self.run_tests, "starting batch");

    std::fs::create_dir_all(&self.log_dir).map_err(|source| PipelineError::Log {
      path: self.log_dir.clone(),
      source,
    })?;

    let mut runs = Vec::with_capacity(packages.len());
    for package in packages {
      let log = package.log_path(&self.log_dir);
      File::create(&log).map_err(|source| PipelineError::Log {
        path: log.clone(),
        source,
      })?;
      runs.push(PackageRun {
        package,
        log,
        state: PackageState::Pending,
        error: None,
      });
    }

    for sweep in Sweep::plan(self.run_tests) {
      debug!(sweep = ?sweep, "starting sweep");
      for run in runs.iter_mut().filter(|r| r.state.is_enabled()) {
        self.run_sweep(run, sweep).await;
      }
    }

    let mut report = BatchReport::default();
    for mut run in runs {
      if run.state.is_enabled() {
        run.state = PackageState::Done;
      }
      report.packages.push(PackageOutcome {
        package: run.package,
        state: run.state,
        error: run.error,
      });
    }

    info!(
      packages = report.packages.len(),
      failed = report.errors().count(),
      "batch complete"
    );
    Ok(report)
  }

  async fn run_sweep(&self, run: &mut PackageRun, sweep: Sweep) {
    for &stage in sweep.stages() {
      run.state = PackageState::Running(stage);
      info!(package = %run.package.name, stage = %stage, "running stage");

      let job = StageJob {
        package: &run.package,
        stage,
        log: &run.log,
      };
      if !self.executor.execute(&job).await {
        self.fail(run, stage);
        return;
      }
    }
  }

  fn fail(&self, run: &mut PackageRun, stage: Stage) {
    let err = BuildError::new(&run.package.name, stage, &run.log);
    error!(package = %err.package, stage = %stage, log = %err.log_path.display(), "stage failed");

    self.notifications.notify(
      &format!("Build error in {} on {}", err.package, self.toolchain),
      &format!("{}\n{}", err.message, err.summary()),
      AlertClass::Error,
    );

    run.state = PackageState::Failed(stage);
    run.error = Some(err);
  }
}
