//! Terminal rendering for `pw`.
//!
//! A command prints either marked status lines followed by an aligned
//! summary block, or exactly one pretty JSON document when run with `-o json`.

use std::fmt::Display;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Outcome shown in front of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
  Done,
  /// Goes to stderr.
  Failed,
  /// Finished, but left something for the user to look at. Goes to stderr.
  Attention,
  Note,
}

impl Mark {
  fn glyph(self) -> &'static str {
    match self {
      Mark::Done => "✓",
      Mark::Failed => "✗",
      Mark::Attention => "!",
      Mark::Note => "·",
    }
  }
}

pub fn status(mark: Mark, message: &str) {
  let glyph = mark.glyph();
  match mark {
    Mark::Done => println!("{} {}", glyph.if_supports_color(Stream::Stdout, |g| g.green()), message),
    Mark::Note => println!("{} {}", glyph.if_supports_color(Stream::Stdout, |g| g.blue()), message),
    Mark::Attention => eprintln!(
      "{} {}",
      glyph.if_supports_color(Stream::Stderr, |g| g.yellow()),
      message.if_supports_color(Stream::Stderr, |m| m.yellow())
    ),
    Mark::Failed => eprintln!(
      "{} {}",
      glyph.if_supports_color(Stream::Stderr, |g| g.red()),
      message.if_supports_color(Stream::Stderr, |m| m.red())
    ),
  }
}

/// `<package> failed at <stage> → <log>`, the line a batch prints per broken package.
pub fn package_failed(package: &str, stage: impl Display, log: &Path) {
  status(Mark::Failed, &format!("{} failed at {} → {}", package, stage, log.display()));
}

/// One indented entry of a listing, e.g. a manifest package.
pub fn item(text: &str) {
  println!("  {} {}", Mark::Note.glyph().if_supports_color(Stream::Stdout, |g| g.dimmed()), text);
}

/// Labeled values printed as an indented block with the values lined up.
#[derive(Debug, Default)]
pub struct Summary {
  rows: Vec<(&'static str, String)>,
}

impl Summary {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn row(mut self, label: &'static str, value: impl Display) -> Self {
    self.rows.push((label, value.to_string()));
    self
  }

  /// Skipped when `value` is absent or empty.
  pub fn row_if(self, label: &'static str, value: Option<impl Display>) -> Self {
    match value.map(|v| v.to_string()).filter(|v| !v.is_empty()) {
      Some(v) => self.row(label, v),
      None => self,
    }
  }

  fn label_width(&self) -> usize {
    self.rows.iter().map(|(label, _)| label.chars().count() + 1).max().unwrap_or(0)
  }

  fn lines(&self) -> Vec<String> {
    let width = self.label_width();
    self
      .rows
      .iter()
      .map(|(label, value)| format!("  {:<width$} {}", format!("{}:", label), value))
      .collect()
  }

  pub fn print(&self) {
    let width = self.label_width();
    for (label, value) in &self.rows {
      let label = format!("{:<width$}", format!("{}:", label));
      println!("  {} {}", label.if_supports_color(Stream::Stdout, |l| l.dimmed()), value);
    }
  }
}

/// The whole JSON document for `-o json`, pretty printed on stdout.
pub fn emit_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
  let mut out = std::io::stdout().lock();
  serde_json::to_writer_pretty(&mut out, value).context("Failed to write JSON output")?;
  writeln!(out).context("Failed to write JSON output")
}

/// Shorten a tagged checksum for display, keeping the `[ALGO]` prefix.
pub fn short_checksum(checksum: &str) -> String {
  let (prefix, digest) = match checksum.find(']') {
    Some(end) => checksum.split_at(end + 1),
    None => ("", checksum),
  };
  let digest: String = digest.chars().take(12).collect();
  format!("{}{}", prefix, digest)
}

/// Wall time of a batch: `850ms`, `4.2s` or `12m07s`.
pub fn format_elapsed(elapsed: Duration) -> String {
  let secs = elapsed.as_secs();
  if secs >= 60 {
    format!("{}m{:02}s", secs / 60, secs % 60)
  } else if secs > 0 {
    format!("{:.1}s", elapsed.as_secs_f64())
  } else {
    format!("{}ms", elapsed.as_millis())
  }
}
