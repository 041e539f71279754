//! Fetch command implementation.

use std::path::Path;

use anyhow::{Context, Result};

use portwright_lib::cache::ToolCache;
use portwright_lib::config::Settings;
use portwright_lib::recipe::{RecipeSource, SourceFetcher};
use portwright_lib::source::{FetchContext, HostSubstitutions};

use crate::output::{Mark, OutputFormat, Summary, emit_json, status};

pub async fn cmd_fetch(recipe: &Path, target: Option<&str>, unpack: Option<&Path>, output: OutputFormat) -> Result<()> {
  let settings = Settings::from_env().context("Invalid configuration")?;
  let recipe = RecipeSource::load(recipe)?;

  let hosts = HostSubstitutions::load(&settings.hosts_path())
    .context("Failed to read host substitutions")?
    .with_account(settings.svn_username.as_deref());
  let cache = ToolCache::from_settings(&settings);
  let lock_dir = settings.lock_dir();
  let fetcher = SourceFetcher {
    ctx: FetchContext {
      offline: settings.offline,
      log: None,
      hosts: &hosts,
      lock_dir: &lock_dir,
      cache: &cache,
    },
    download_dir: settings.download_dir.clone(),
    checkout_dir: settings.checkout_dir(),
  };

  let fetched = fetcher
    .fetch(&recipe, target)
    .await
    .with_context(|| format!("Failed to fetch {}", recipe.name))?;
  if let Some(dest) = unpack {
    fetcher
      .unpack(&fetched, dest)
      .await
      .with_context(|| format!("Failed to unpack {} into {}", recipe.name, dest.display()))?;
  }
  if let Err(e) = cache.save() {
    tracing::warn!(error = %e, "failed to save tool cache");
  }

  if output.is_json() {
    emit_json(&serde_json::json!({
      "package": recipe.name,
      "target": fetched.target,
      "kind": fetched.kind.to_string(),
      "paths": fetched.paths,
      "unpacked": unpack.map(|d| d.display().to_string()),
    }))?;
  } else {
    status(Mark::Done, &format!("Fetched {} {}", recipe.name, fetched.target));
    let summary = fetched
      .paths
      .iter()
      .fold(Summary::new().row("Backend", &fetched.kind), |summary, path| {
        summary.row("Path", path.display())
      });
    summary.row_if("Unpacked", unpack.map(Path::display)).print();
  }
  Ok(())
}
