//! Batch command implementation.
//!
//! Runs the fetch, build, package and upload sweeps over a package list.
//! Packages with a recipe are fetched, unpacked, listed and merged in-process.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use portwright_lib::config::Settings;
use portwright_lib::notify::Notifications;
use portwright_lib::pipeline::{EngineExecutor, Orchestrator, PackageState, package_list};

use crate::output::{Mark, OutputFormat, Summary, emit_json, format_elapsed, package_failed, status};

pub async fn cmd_batch(list: &Path, tests: bool, output: OutputFormat) -> Result<bool> {
  let start = Instant::now();
  let settings = Settings::from_env().context("Invalid configuration")?;
  let packages =
    package_list::load(list).with_context(|| format!("Failed to read package list {}", list.display()))?;

  let notifications =
    Notifications::from_names(&settings.notify, &settings.log_dir, settings.ci).context("Invalid notification setup")?;
  let executor = EngineExecutor::from_settings(&settings).context("Failed to read host substitutions")?;
  let orchestrator = Orchestrator::new(
    executor,
    notifications,
    &settings.log_dir,
    settings.toolchain.clone(),
  )
  .with_tests(tests);

  let report = orchestrator.run(packages).await.context("Batch could not start")?;
  if let Err(e) = orchestrator.executor().cache().save() {
    tracing::warn!(error = %e, "failed to save tool cache");
  }

  if output.is_json() {
    let packages: Vec<_> = report
      .packages
      .iter()
      .map(|p| {
        let (state, stage) = match p.state {
          PackageState::Failed(stage) => ("failed", Some(stage.as_str())),
          _ => ("done", None),
        };
        serde_json::json!({
          "name": p.package.name,
          "target": p.package.target,
          "state": state,
          "stage": stage,
          "log": p.error.as_ref().map(|e| e.log_path.display().to_string()),
        })
      })
      .collect();
    emit_json(&serde_json::json!({ "packages": packages, "failed": report.has_failures() }))?;
  } else {
    for outcome in &report.packages {
      match &outcome.error {
        None => status(Mark::Done, &outcome.package.name),
        Some(err) => {
          package_failed(&outcome.package.name, err.stage, &err.log_path);
          eprintln!("{}", err.summary());
        }
      }
    }
    println!();
    Summary::new()
      .row("Packages", report.packages.len())
      .row("Failed", report.errors().count())
      .row("Duration", format_elapsed(start.elapsed()))
      .print();
  }

  Ok(!report.has_failures())
}
