//! The source side of a package recipe.
//!
//! A recipe names its package, maps each build target (a version) to its
//! download URLs or version control location, and optionally lists the
//! expected digests of each download. Everything else about a recipe is the
//! stage driver's business.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::source::archive::{ArchiveError, unpack_files};
use crate::source::download::{fetch_file, file_name_from_url};
use crate::source::{FetchContext, SourceBackend, SourceLocation, VcsKind};
use crate::util::hash::{self, HashAlgorithm};
use crate::version;

#[derive(Debug, Error)]
pub enum RecipeError {
  #[error("{package} has no build targets")]
  NoTarget { package: String },

  #[error("{package} has no target {target:?}")]
  UnknownTarget { package: String, target: String },

  #[error("failed to fetch {url}")]
  FetchFailed { url: String },

  #[error("digest mismatch for {path}")]
  DigestMismatch { path: PathBuf },

  #[error(transparent)]
  Unpack(#[from] ArchiveError),

  #[error("failed to read recipe {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse recipe {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

fn default_algorithm() -> HashAlgorithm {
  HashAlgorithm::Sha1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeSource {
  pub name: String,
  /// Target → download URLs.
  #[serde(default)]
  pub targets: BTreeMap<String, Vec<String>>,
  /// Target → version control URL.
  #[serde(default)]
  pub vcs_targets: BTreeMap<String, String>,
  /// Target → expected digests, aligned with the download URLs.
  #[serde(default)]
  pub digests: BTreeMap<String, Vec<String>>,
  #[serde(default = "default_algorithm")]
  pub digest_algorithm: HashAlgorithm,
  #[serde(default)]
  pub default_target: Option<String>,
}

impl RecipeSource {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      targets: BTreeMap::new(),
      vcs_targets: BTreeMap::new(),
      digests: BTreeMap::new(),
      digest_algorithm: default_algorithm(),
      default_target: None,
    }
  }

  /// Read a recipe's source description from a JSON file.
  pub fn load(path: &Path) -> Result<Self, RecipeError> {
    let content = std::fs::read_to_string(path).map_err(|source| RecipeError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| RecipeError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Look up the recipe of `package` in `recipes_dir`. `None` when it has none.
  pub fn find(recipes_dir: &Path, package: &str) -> Result<Option<Self>, RecipeError> {
    let path = recipes_dir.join(format!("{}.json", package));
    if !path.is_file() {
      return Ok(None);
    }
    Self::load(&path).map(Some)
  }

  /// The explicit default, else the newest target by version ordering.
  pub fn default_target(&self) -> Option<String> {
    if let Some(target) = &self.default_target {
      return Some(target.clone());
    }
    version::latest(self.targets.keys().chain(self.vcs_targets.keys()).map(String::as_str)).map(String::from)
  }

  pub fn is_vcs_target(&self, target: &str) -> bool {
    self.vcs_targets.contains_key(target)
  }

  fn has_target(&self, target: &str) -> bool {
    self.targets.contains_key(target) || self.vcs_targets.contains_key(target)
  }

  /// Check downloaded files against the recipe's digests, or their `.sha1`
  /// sidecars when the recipe lists none.
  pub fn verify_downloads(&self, target: &str, files: &[PathBuf]) -> Result<(), RecipeError> {
    match self.digests.get(target).filter(|d| !d.is_empty()) {
      Some(expected) => {
        for (file, digest) in files.iter().zip(expected) {
          if !hash::verify_file(file, digest, self.digest_algorithm) {
            warn!(path = %file.display(), algorithm = %self.digest_algorithm, "digest mismatch");
            return Err(RecipeError::DigestMismatch { path: file.clone() });
          }
        }
      }
      None => {
        for file in files {
          match hash::verify_sidecar(file) {
            Some(false) => {
              warn!(path = %file.display(), "sidecar digest mismatch");
              return Err(RecipeError::DigestMismatch { path: file.clone() });
            }
            Some(true) => debug!(path = %file.display(), "sidecar digest verified"),
            None => debug!(path = %file.display(), "no digest to verify against"),
          }
        }
      }
    }
    Ok(())
  }
}

/// Result of fetching a recipe target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSource {
  pub target: String,
  pub kind: VcsKind,
  /// Downloaded files, or the checkout directory.
  pub paths: Vec<PathBuf>,
}

/// Fetches recipe targets into the download and checkout directories.
#[derive(Debug)]
pub struct SourceFetcher<'a> {
  pub ctx: FetchContext<'a>,
  pub download_dir: PathBuf,
  pub checkout_dir: PathBuf,
}

impl SourceFetcher<'_> {
  /// Fetch `target`, or the recipe's default target, and verify downloads.
  pub async fn fetch(&self, recipe: &RecipeSource, target: Option<&str>) -> Result<FetchedSource, RecipeError> {
    let target = match target {
      Some(t) => t.to_string(),
      None => recipe.default_target().ok_or_else(|| RecipeError::NoTarget {
        package: recipe.name.clone(),
      })?,
    };
    if !recipe.has_target(&target) {
      return Err(RecipeError::UnknownTarget {
        package: recipe.name.clone(),
        target,
      });
    }

    if let Some(url) = recipe.vcs_targets.get(&target) {
      let location = SourceLocation::parse(url);
      let checkout = self.checkout_dir.join(location.name());
      info!(package = %recipe.name, target = %target, kind = %location.kind, "fetching checkout");

      // a vcs target always goes through a version control backend
      let backend = match location.kind {
        VcsKind::None => SourceBackend::Svn,
        kind => SourceBackend::for_kind(kind),
      };
      if !backend.fetch(&location, &checkout, &self.ctx).await {
        return Err(RecipeError::FetchFailed { url: url.clone() });
      }
      return Ok(FetchedSource {
        target,
        kind: backend.kind(),
        paths: vec![checkout],
      });
    }

    let urls = recipe.targets.get(&target).cloned().unwrap_or_default();
    let mut files = Vec::with_capacity(urls.len());
    for url in &urls {
      let url = self.ctx.hosts.apply(url);
      let name = file_name_from_url(&url);
      let dest = self.download_dir.join(&name);

      if self.ctx.offline {
        debug!(url = %url, "offline, using existing download");
        files.push(dest);
        continue;
      }

      info!(package = %recipe.name, url = %url, "downloading");
      match fetch_file(&url, &self.download_dir, Some(&name), self.ctx.cache, self.ctx.log).await {
        Ok(path) => files.push(path),
        Err(e) => {
          warn!(url = %url, error = %e, "download failed");
          return Err(RecipeError::FetchFailed { url });
        }
      }
    }

    recipe.verify_downloads(&target, &files)?;
    Ok(FetchedSource {
      target,
      kind: VcsKind::None,
      paths: files,
    })
  }

  /// Unpack fetched downloads into `dest`. Checkouts are used in place.
  pub async fn unpack(&self, fetched: &FetchedSource, dest: &Path) -> Result<(), RecipeError> {
    if fetched.kind.is_vcs() {
      debug!(target = %fetched.target, "checkout needs no unpacking");
      return Ok(());
    }
    unpack_files(&fetched.paths, dest, self.ctx.cache, self.ctx.log).await?;
    Ok(())
  }
}
