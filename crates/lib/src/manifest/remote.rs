//! Fetching manifests published next to remote package repositories.

use std::time::Duration;

use tracing::debug;

use super::{BuildManifest, ManifestError};
use crate::consts::REMOTE_MANIFEST_SUFFIX;
use crate::platform::Toolchain;

/// Normalize a repository URL: surrounding whitespace and trailing slashes removed.
pub fn normalize_url(url: &str) -> &str {
  url.trim().trim_end_matches('/')
}

/// The manifest endpoint of a repository URL.
pub fn manifest_url(url: &str) -> String {
  format!("{}/{}", normalize_url(url), REMOTE_MANIFEST_SUFFIX)
}

/// Download and parse `<url>/manifest.json`, tagging it with its origin.
pub async fn fetch_remote(url: &str, toolchain: &Toolchain, timeout: Duration) -> Result<BuildManifest, ManifestError> {
  let endpoint = manifest_url(url);
  let http_err = |source| ManifestError::Http {
    url: endpoint.clone(),
    source,
  };

  debug!(url = %endpoint, "fetching remote manifest");
  let client = reqwest::Client::builder().timeout(timeout).build().map_err(http_err)?;
  let body = client
    .get(&endpoint)
    .send()
    .await
    .and_then(reqwest::Response::error_for_status)
    .map_err(http_err)?
    .text()
    .await
    .map_err(http_err)?;

  let mut manifest = BuildManifest::from_json_str(&body, toolchain.clone())?;
  manifest.origin = Some(normalize_url(url).to_string());
  Ok(manifest)
}
