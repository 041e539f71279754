//! Stages run inside the engine.
//!
//! A package with a recipe in the recipe directory is fetched, unpacked,
//! listed and merged by the library itself. Compiling, installing, testing,
//! packaging and uploading stay with the driver, which learns the work and
//! image directories from its environment. A package without a recipe is
//! handed to the driver for every stage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use super::executor::{DriverExecutor, StageExecutor, StageJob, append_log};
use super::types::{PackageDescriptor, Stage};
use crate::cache::ToolCache;
use crate::config::Settings;
use crate::manifest::{BuildManifest, ManifestEntryFile};
use crate::platform::{Toolchain, paths};
use crate::recipe::{RecipeSource, SourceFetcher};
use crate::reconcile::{ListedFile, list_checksummed, merge_into, remove};
use crate::source::hosts::HostsError;
use crate::source::{FetchContext, HostSubstitutions};
use crate::util::fs::write_atomic;
use crate::util::hash::{HashAlgorithm, tagged_digest_file};

#[derive(Debug)]
pub struct EngineExecutor {
  driver: DriverExecutor,
  root: PathBuf,
  recipes_dir: PathBuf,
  build_dir: PathBuf,
  download_dir: PathBuf,
  checkout_dir: PathBuf,
  lock_dir: PathBuf,
  manifest_path: PathBuf,
  toolchain: Toolchain,
  offline: bool,
  hardlink: bool,
  hosts: HostSubstitutions,
  cache: ToolCache,
}

impl EngineExecutor {
  pub fn new(driver: DriverExecutor, settings: &Settings, hosts: HostSubstitutions, cache: ToolCache) -> Self {
    Self {
      driver,
      root: settings.root.clone(),
      recipes_dir: settings.recipes_dir(),
      build_dir: settings.build_dir.clone(),
      download_dir: settings.download_dir.clone(),
      checkout_dir: settings.checkout_dir(),
      lock_dir: settings.lock_dir(),
      manifest_path: settings.manifest_path(),
      toolchain: settings.toolchain.clone(),
      offline: settings.offline,
      hardlink: settings.use_hardlinks,
      hosts,
      cache,
    }
  }

  /// Driver, host table and tool cache all configured from `settings`.
  pub fn from_settings(settings: &Settings) -> Result<Self, HostsError> {
    let hosts = HostSubstitutions::load(&settings.hosts_path())?.with_account(settings.svn_username.as_deref());
    Ok(Self::new(
      DriverExecutor::from_settings(settings),
      settings,
      hosts,
      ToolCache::from_settings(settings),
    ))
  }

  pub fn cache(&self) -> &ToolCache {
    &self.cache
  }

  /// Name of a package's listing, both in its image and in the root.
  pub fn listing_name(package: &PackageDescriptor) -> String {
    format!("{}.json", package.file_stem())
  }

  fn fetcher<'a>(&'a self, log: &'a Path, offline: bool) -> SourceFetcher<'a> {
    SourceFetcher {
      ctx: FetchContext {
        offline,
        log: Some(log),
        hosts: &self.hosts,
        lock_dir: &self.lock_dir,
        cache: &self.cache,
      },
      download_dir: self.download_dir.clone(),
      checkout_dir: self.checkout_dir.clone(),
    }
  }

  async fn fetch(&self, job: &StageJob<'_>, recipe: &RecipeSource) -> bool {
    match self.fetcher(job.log, self.offline).fetch(recipe, job.package.target.as_deref()).await {
      Ok(fetched) => {
        append_log(job.log, &format!("fetched {} {} ({})\n", recipe.name, fetched.target, fetched.kind));
        true
      }
      Err(e) => fail(job, &format!("fetch failed: {}", e)),
    }
  }

  /// Resolve the fetched sources without touching the network, then unpack them.
  async fn unpack(&self, job: &StageJob<'_>, recipe: &RecipeSource) -> bool {
    let fetcher = self.fetcher(job.log, true);
    let fetched = match fetcher.fetch(recipe, job.package.target.as_deref()).await {
      Ok(fetched) => fetched,
      Err(e) => return fail(job, &format!("sources are not available: {}", e)),
    };

    let work = job.package.work_dir(&self.build_dir);
    match fetcher.unpack(&fetched, &work).await {
      Ok(()) => {
        append_log(job.log, &format!("unpacked {} into {}\n", recipe.name, work.display()));
        true
      }
      Err(e) => fail(job, &format!("unpack failed: {}", e)),
    }
  }

  /// List the image and store the listing inside it, so qmerge installs it too.
  fn write_listing(&self, job: &StageJob<'_>) -> bool {
    let image = job.package.image_dir(&self.build_dir);
    if !image.is_dir() {
      return fail(job, &format!("image directory {} does not exist", image.display()));
    }

    let listing = match list_checksummed(&image) {
      Ok(listing) => listing,
      Err(e) => return fail(job, &format!("failed to list image: {}", e)),
    };
    let path = paths::installed_dir(&image).join(Self::listing_name(job.package));
    let written = serde_json::to_vec_pretty(&listing)
      .map_err(std::io::Error::other)
      .and_then(|content| write_atomic(&path, &content));
    match written {
      Ok(()) => {
        append_log(job.log, &format!("listed {} files in {}\n", listing.len(), path.display()));
        true
      }
      Err(e) => fail(job, &format!("failed to write {}: {}", path.display(), e)),
    }
  }

  /// Replace the previous install of the package with its image, then record it.
  fn qmerge(&self, job: &StageJob<'_>, recipe: &RecipeSource) -> bool {
    let image = job.package.image_dir(&self.build_dir);
    let installed = paths::installed_dir(&self.root).join(Self::listing_name(job.package));

    if let Some(previous) = read_listing(&installed) {
      let report = remove(&self.root, &previous, false);
      append_log(
        job.log,
        &format!(
          "unmerged previous install: {} removed, {} kept\n",
          report.removed.len(),
          report.retained.len()
        ),
      );
    }

    let report = match merge_into(&image, &self.root, self.hardlink) {
      Ok(report) => report,
      Err(e) => return fail(job, &format!("merge failed: {}", e)),
    };
    append_log(
      job.log,
      &format!(
        "merged {} into {}: {} copied, {} linked\n",
        image.display(),
        self.root.display(),
        report.copied,
        report.linked
      ),
    );

    let checksum = match tagged_digest_file(&installed, HashAlgorithm::DEFAULT) {
      Ok(checksum) => checksum,
      Err(e) => return fail(job, &format!("no listing for {}: {}", job.package.name, e)),
    };
    let mut manifest = match BuildManifest::load_local(&self.manifest_path, self.toolchain.clone()) {
      Ok(manifest) => manifest.unwrap_or_else(|| BuildManifest::new(self.toolchain.clone())),
      Err(e) => return fail(job, &format!("failed to load manifest: {}", e)),
    };
    let version = job
      .package
      .target
      .clone()
      .or_else(|| recipe.default_target())
      .unwrap_or_default();
    manifest.get(&job.package.name).add_file(
      ManifestEntryFile::new(Self::listing_name(job.package), checksum)
        .with_version(version)
        .with_build_prefix(self.root.display().to_string()),
    );
    if let Err(e) = manifest.dump(&self.manifest_path, false) {
      return fail(job, &format!("failed to write manifest: {}", e));
    }

    info!(package = %job.package.name, copied = report.copied, linked = report.linked, "merged into root");
    true
  }
}

#[async_trait]
impl StageExecutor for EngineExecutor {
  async fn execute(&self, job: &StageJob<'_>) -> bool {
    let recipe = match RecipeSource::find(&self.recipes_dir, &job.package.name) {
      Ok(Some(recipe)) => recipe,
      Ok(None) => return self.driver.execute(job).await,
      Err(e) => return fail(job, &format!("invalid recipe: {}", e)),
    };

    match job.stage {
      Stage::Fetch => self.fetch(job, &recipe).await,
      Stage::Unpack => self.unpack(job, &recipe).await,
      Stage::Manifest => self.write_listing(job),
      Stage::Qmerge => self.qmerge(job, &recipe),
      _ => self.driver.execute(job).await,
    }
  }
}

fn read_listing(path: &Path) -> Option<Vec<ListedFile>> {
  let content = std::fs::read_to_string(path).ok()?;
  match serde_json::from_str(&content) {
    Ok(listing) => Some(listing),
    Err(e) => {
      warn!(path = %path.display(), error = %e, "ignoring unreadable listing");
      None
    }
  }
}

/// Log a stage failure to both the tracing output and the package log.
fn fail(job: &StageJob<'_>, message: &str) -> bool {
  warn!(package = %job.package.name, stage = %job.stage, "{}", message);
  append_log(job.log, &format!("{}\n", message));
  false
}
