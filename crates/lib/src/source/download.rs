//! Plain file downloads.
//!
//! `wget -c -t 10` is preferred when installed, it resumes partial files and
//! retries on its own. Without it the built-in HTTP client streams into a
//! `.part` file that is renamed on completion; an existing destination is
//! reused as is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::cache::ToolCache;
use crate::process::LoggedCommand;

#[derive(Debug, Error)]
pub enum DownloadError {
  #[error("no URL given")]
  EmptyUrl,

  #[error("request to {url} failed: {source}")]
  Http {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("download tool failed for {url}")]
  ToolFailed { url: String },
}

/// File name a URL downloads to: the last path segment without query.
pub fn file_name_from_url(url: &str) -> String {
  let last = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
  let name = last.split(['?', '#']).next().unwrap_or(last);
  if name.is_empty() {
    "download".to_string()
  } else {
    name.to_string()
  }
}

/// Download `url` into `dest_dir`, named `file_name` or after the URL.
///
/// Returns the path of the downloaded file.
pub async fn fetch_file(
  url: &str,
  dest_dir: &Path,
  file_name: Option<&str>,
  cache: &ToolCache,
  log: Option<&Path>,
) -> Result<PathBuf, DownloadError> {
  if url.trim().is_empty() {
    return Err(DownloadError::EmptyUrl);
  }

  let name = file_name.map_or_else(|| file_name_from_url(url), String::from);
  let dest = dest_dir.join(&name);
  tokio::fs::create_dir_all(dest_dir)
    .await
    .map_err(|source| DownloadError::Write {
      path: dest_dir.to_path_buf(),
      source,
    })?;

  if let Some(wget) = cache.find_application("wget") {
    info!(url, dest = %dest.display(), "downloading with wget");
    let ok = LoggedCommand::new(wget)
      .args(["-c", "-t", "10", "-O"])
      .arg(&dest)
      .arg(url)
      .log(log)
      .succeeds()
      .await;
    return if ok {
      Ok(dest)
    } else {
      Err(DownloadError::ToolFailed { url: url.to_string() })
    };
  }

  if dest.exists() {
    debug!(path = %dest.display(), "already downloaded");
    return Ok(dest);
  }

  info!(url, dest = %dest.display(), "downloading");
  download_http(url, &dest, cache.timeout()).await?;
  Ok(dest)
}

/// Stream `url` into `dest`. `timeout` bounds connecting and every read, not the whole transfer.
async fn download_http(url: &str, dest: &Path, timeout: Duration) -> Result<(), DownloadError> {
  let http_err = |source| DownloadError::Http {
    url: url.to_string(),
    source,
  };

  let mut part_name = dest.as_os_str().to_os_string();
  part_name.push(".part");
  let part = PathBuf::from(part_name);
  let write_err = |source| DownloadError::Write {
    path: part.clone(),
    source,
  };

  let client = reqwest::Client::builder()
    .connect_timeout(timeout)
    .read_timeout(timeout)
    .build()
    .map_err(http_err)?;
  let mut response = client
    .get(url)
    .send()
    .await
    .and_then(reqwest::Response::error_for_status)
    .map_err(http_err)?;

  let mut file = tokio::fs::File::create(&part).await.map_err(write_err)?;
  let mut size = 0usize;
  while let Some(chunk) = response.chunk().await.map_err(http_err)? {
    file.write_all(&chunk).await.map_err(write_err)?;
    size += chunk.len();
  }
  file.flush().await.map_err(write_err)?;
  drop(file);

  if let Err(source) = tokio::fs::rename(&part, dest).await {
    warn!(path = %part.display(), "could not move partial download into place");
    return Err(DownloadError::Write {
      path: dest.to_path_buf(),
      source,
    });
  }

  info!(path = %dest.display(), size, "download complete");
  Ok(())
}
