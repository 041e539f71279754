//! Package list files: one `name,target,patchlevel` line per package.
//!
//! Lines starting with `#` and blank lines are skipped. An empty target means
//! the recipe's default target.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::types::PackageDescriptor;

#[derive(Debug, Error)]
pub enum PackageListError {
  #[error("failed to read package list {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("line {line}: missing package name")]
  MissingName { line: usize },
}

pub fn parse(content: &str) -> Result<Vec<PackageDescriptor>, PackageListError> {
  let mut packages = Vec::new();
  for (index, raw) in content.lines().enumerate() {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }

    let mut fields = line.split(',').map(str::trim);
    let name = fields.next().unwrap_or_default();
    if name.is_empty() {
      return Err(PackageListError::MissingName { line: index + 1 });
    }

    let mut package = PackageDescriptor::new(name);
    if let Some(target) = fields.next().filter(|t| !t.is_empty()) {
      package = package.with_target(target);
    }
    if let Some(patch_level) = fields.next() {
      package = package.with_patch_level(patch_level);
    }
    packages.push(package);
  }
  Ok(packages)
}

pub fn load(path: &Path) -> Result<Vec<PackageDescriptor>, PackageListError> {
  let content = std::fs::read_to_string(path).map_err(|source| PackageListError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  parse(&content)
}
