//! Manifest commands: show, sync and record.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};

use portwright_lib::config::Settings;
use portwright_lib::manifest::{BuildManifest, ManifestEntry, ManifestEntryFile, format_timestamp};
use portwright_lib::util::hash::{HashAlgorithm, tagged_digest_file};

use crate::output::{Mark, OutputFormat, Summary, emit_json, item, short_checksum, status};

pub fn cmd_manifest_show(package: Option<&str>, output: OutputFormat) -> Result<()> {
  let settings = Settings::from_env().context("Invalid configuration")?;
  let path = settings.manifest_path();
  let Some(manifest) = BuildManifest::load_local(&path, settings.toolchain.clone())
    .with_context(|| format!("Failed to load manifest {}", path.display()))?
  else {
    status(Mark::Note, &format!("No manifest at {}", path.display()));
    return Ok(());
  };

  if output.is_json() {
    let selected: BTreeMap<&String, Vec<&ManifestEntry>> = manifest
      .packages
      .iter()
      .map(|(toolchain, entries)| {
        let entries = entries.values().filter(|e| package.is_none_or(|p| e.name == p)).collect();
        (toolchain, entries)
      })
      .collect();
    return emit_json(&serde_json::json!({
      "date": format_timestamp(&manifest.date),
      "origin": manifest.origin,
      "packages": selected,
    }));
  }

  Summary::new()
    .row("Date", format_timestamp(&manifest.date))
    .row_if("Origin", manifest.origin.as_ref())
    .print();
  for (toolchain, entries) in &manifest.packages {
    println!();
    println!("{}:", toolchain);
    for entry in entries.values().filter(|e| package.is_none_or(|p| e.name == p)) {
      match entry.latest() {
        Some(latest) => item(&format!(
          "{} {} ({} {} {})",
          entry.name,
          latest.version,
          latest.file_name,
          short_checksum(&latest.checksum),
          format_timestamp(&latest.date)
        )),
        None => item(&entry.name),
      }
    }
  }
  Ok(())
}

pub async fn cmd_manifest_sync(output: OutputFormat) -> Result<()> {
  let settings = Settings::from_env().context("Invalid configuration")?;
  let path = settings.manifest_path();

  let mut manifest = BuildManifest::load(
    &path,
    &settings.manifest_urls,
    settings.toolchain.clone(),
    settings.network_timeout,
  )
  .await
  .with_context(|| format!("Failed to load manifest {}", path.display()))?;
  let written = manifest.dump(&path, false).context("Failed to write manifest")?;

  let count: usize = manifest.packages.values().map(|entries| entries.len()).sum();
  if output.is_json() {
    emit_json(&serde_json::json!({
      "path": written.display().to_string(),
      "remotes": settings.manifest_urls,
      "packages": count,
    }))?;
  } else {
    status(Mark::Done, &format!("Manifest written to {}", written.display()));
    Summary::new()
      .row("Remotes", settings.manifest_urls.len())
      .row("Packages", count)
      .print();
  }
  Ok(())
}

pub fn cmd_manifest_record(
  package: &str,
  file: &Path,
  version: &str,
  build_prefix: Option<String>,
  options: &[String],
  output: OutputFormat,
) -> Result<()> {
  let settings = Settings::from_env().context("Invalid configuration")?;
  let path = settings.manifest_path();

  let options = parse_options(options)?;
  let checksum = tagged_digest_file(file, HashAlgorithm::DEFAULT)
    .with_context(|| format!("Failed to hash {}", file.display()))?;
  let file_name = file
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .with_context(|| format!("Not a file: {}", file.display()))?;

  let mut manifest = BuildManifest::load_local(&path, settings.toolchain.clone())
    .with_context(|| format!("Failed to load manifest {}", path.display()))?
    .unwrap_or_else(|| BuildManifest::new(settings.toolchain.clone()));

  let build_prefix = build_prefix.unwrap_or_else(|| settings.root.display().to_string());
  let record = ManifestEntryFile::new(file_name, checksum)
    .with_version(version)
    .with_build_prefix(build_prefix)
    .with_options(options);
  let recorded = manifest.get(package).add_file(record).clone();
  manifest.dump(&path, false).context("Failed to write manifest")?;

  if output.is_json() {
    emit_json(&recorded)?;
  } else {
    status(
      Mark::Done,
      &format!(
        "Recorded {} for {} → {}",
        recorded.file_name,
        package,
        short_checksum(&recorded.checksum)
      ),
    );
  }
  Ok(())
}

fn parse_options(options: &[String]) -> Result<BTreeMap<String, String>> {
  options
    .iter()
    .map(|option| match option.split_once('=') {
      Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
      _ => bail!("Invalid option {:?}, expected KEY=VALUE", option),
    })
    .collect()
}
