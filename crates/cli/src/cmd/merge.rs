//! Merge and unmerge command implementations.
//!
//! Both default to the configured install root.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use portwright_lib::config::Settings;
use portwright_lib::reconcile::{ListedFile, merge_into, remove};

use crate::output::{Mark, OutputFormat, Summary, emit_json, status};

pub fn cmd_merge(image: &Path, root: Option<PathBuf>, hardlink: bool, output: OutputFormat) -> Result<()> {
  let settings = Settings::from_env().context("Invalid configuration")?;
  let root = root.unwrap_or(settings.root);
  let hardlink = hardlink || settings.use_hardlinks;

  let report = merge_into(image, &root, hardlink)
    .with_context(|| format!("Failed to merge {} into {}", image.display(), root.display()))?;

  if output.is_json() {
    emit_json(&serde_json::json!({
      "root": root.display().to_string(),
      "copied": report.copied,
      "linked": report.linked,
      "overridden": report.overridden,
    }))?;
  } else {
    status(Mark::Done, &format!("Merged {} into {}", image.display(), root.display()));
    Summary::new()
      .row("Copied", report.copied)
      .row("Linked", report.linked)
      .row("Overridden", report.overridden.len())
      .print();
  }
  Ok(())
}

/// `Ok(false)` when a file could not be removed.
pub fn cmd_unmerge(listing: &Path, root: Option<PathBuf>, force: bool, output: OutputFormat) -> Result<bool> {
  let settings = Settings::from_env().context("Invalid configuration")?;
  let root = root.unwrap_or(settings.root);

  let content =
    std::fs::read_to_string(listing).with_context(|| format!("Failed to read listing {}", listing.display()))?;
  let files: Vec<ListedFile> =
    serde_json::from_str(&content).with_context(|| format!("Invalid listing {}", listing.display()))?;

  let report = remove(&root, &files, force);

  if output.is_json() {
    emit_json(&serde_json::json!({
      "removed": report.removed,
      "forced": report.forced,
      "retained": report.retained,
      "missing": report.missing,
      "failed": report.failed,
    }))?;
  } else {
    let removed = report.removed.len() + report.forced.len();
    status(Mark::Done, &format!("Removed {} file(s) from {}", removed, root.display()));
    if !report.retained.is_empty() {
      status(
        Mark::Attention,
        &format!("Kept {} modified file(s), use --force to delete them", report.retained.len()),
      );
    }
    Summary::new()
      .row("Missing", report.missing.len())
      .row("Failed", report.failed.len())
      .print();
  }
  Ok(report.failed.is_empty())
}
