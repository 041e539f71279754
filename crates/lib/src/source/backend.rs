//! Source backends: one variant per version control kind plus plain downloads.
//!
//! Every backend satisfies the same `{fetch, update}` contract. All work is
//! done by external programs; a non-zero exit status is a `false` result, not
//! an error. Checkouts into the shared root hold a [`ScopedLock`] named after
//! the backend for their whole duration.

use std::path::Path;

use tracing::{debug, info, warn};

use super::download::fetch_file;
use super::hosts::HostSubstitutions;
use super::url::{SourceLocation, VcsKind};
use crate::cache::ToolCache;
use crate::lock::ScopedLock;
use crate::process::LoggedCommand;

/// Everything a backend needs besides the location itself.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext<'a> {
  pub offline: bool,
  pub log: Option<&'a Path>,
  pub hosts: &'a HostSubstitutions,
  pub lock_dir: &'a Path,
  pub cache: &'a ToolCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceBackend {
  Git,
  Svn,
  Hg,
  Cvs,
  Download,
}

impl SourceBackend {
  pub fn for_kind(kind: VcsKind) -> Self {
    match kind {
      VcsKind::Git => Self::Git,
      VcsKind::Svn => Self::Svn,
      VcsKind::Hg => Self::Hg,
      VcsKind::Cvs => Self::Cvs,
      VcsKind::None => Self::Download,
    }
  }

  /// Backend for a raw recipe URL.
  pub fn for_url(url: &str) -> Self {
    Self::for_kind(super::url::classify(url))
  }

  pub fn kind(self) -> VcsKind {
    match self {
      Self::Git => VcsKind::Git,
      Self::Svn => VcsKind::Svn,
      Self::Hg => VcsKind::Hg,
      Self::Cvs => VcsKind::Cvs,
      Self::Download => VcsKind::None,
    }
  }

  fn program(self) -> &'static str {
    match self {
      Self::Git => "git",
      Self::Svn => "svn",
      Self::Hg => "hg",
      Self::Cvs => "cvs",
      Self::Download => "wget",
    }
  }

  /// Logical resource id of the lock guarding this backend's checkouts.
  pub fn lock_resource(self) -> String {
    self.program().to_uppercase()
  }

  /// Administrative entry marking an existing checkout.
  fn checkout_marker(self) -> Option<&'static str> {
    match self {
      Self::Git => Some(".git"),
      Self::Svn => Some(".svn"),
      Self::Hg => Some(".hg"),
      Self::Cvs => Some("CVS"),
      Self::Download => None,
    }
  }

  /// Whether `dir` already holds a checkout of this kind.
  pub fn is_checkout(self, dir: &Path) -> bool {
    self.checkout_marker().is_some_and(|marker| dir.join(marker).exists())
  }

  /// Fetch `location` into `dest`.
  ///
  /// For version control this is the checkout directory: an existing
  /// checkout is updated, otherwise a fresh one is cloned. For downloads
  /// `dest` is the directory the file is saved in.
  pub async fn fetch(self, location: &SourceLocation, dest: &Path, ctx: &FetchContext<'_>) -> bool {
    if self == Self::Download {
      return self.download(location, dest, ctx).await;
    }

    if self.is_checkout(dest) {
      return self.update(dest, ctx).await;
    }

    if ctx.offline {
      info!(backend = %self.kind(), dest = %dest.display(), "offline, skipping checkout");
      return true;
    }

    let Some(_lock) = self.lock(ctx).await else {
      return false;
    };
    self.checkout(location, dest, ctx).await
  }

  /// Bring an existing checkout up to date.
  pub async fn update(self, dir: &Path, ctx: &FetchContext<'_>) -> bool {
    if ctx.offline {
      info!(backend = %self.kind(), dir = %dir.display(), "offline, skipping update");
      return true;
    }

    let args: &[&str] = match self {
      Self::Git => &["pull"],
      Self::Svn => &["update"],
      Self::Hg => &["pull", "-u"],
      Self::Cvs => &["update", "-d"],
      Self::Download => return true,
    };

    let Some(program) = self.find_program(ctx) else {
      return false;
    };
    let Some(_lock) = self.lock(ctx).await else {
      return false;
    };

    LoggedCommand::new(program)
      .args(args)
      .current_dir(dir)
      .log(ctx.log)
      .succeeds()
      .await
  }

  async fn checkout(self, location: &SourceLocation, dest: &Path, ctx: &FetchContext<'_>) -> bool {
    let Some(program) = self.find_program(ctx) else {
      return false;
    };
    let Some(parent) = dest.parent() else {
      warn!(dest = %dest.display(), "checkout directory has no parent");
      return false;
    };
    let name = dest
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| location.name().to_string());

    if let Err(e) = tokio::fs::create_dir_all(parent).await {
      warn!(dir = %parent.display(), error = %e, "cannot create checkout parent");
      return false;
    }

    let repository = ctx.hosts.apply(&location.repository);
    debug!(backend = %self.kind(), repository = %repository, dest = %dest.display(), "checking out");

    let command = LoggedCommand::new(&program).current_dir(parent).log(ctx.log);
    let command = match self {
      Self::Git => {
        let command = command.arg("clone");
        let command = if location.branch.is_empty() {
          command
        } else {
          command.args(["--branch", location.branch.as_str()])
        };
        command.arg(&repository).arg(&name)
      }
      Self::Svn => {
        let url = if location.branch.is_empty() {
          repository
        } else {
          format!("{}/{}", repository.trim_end_matches('/'), location.branch)
        };
        let command = command.arg("checkout");
        let command = if location.tag.is_empty() {
          command
        } else {
          command.args(["-r", location.tag.as_str()])
        };
        command.arg(url).arg(&name)
      }
      Self::Hg => {
        let command = command.arg("clone");
        let command = if location.branch.is_empty() {
          command
        } else {
          command.args(["-b", location.branch.as_str()])
        };
        command.arg(&repository).arg(&name)
      }
      Self::Cvs => {
        let module = if location.branch.is_empty() {
          name.as_str()
        } else {
          location.branch.as_str()
        };
        let command = command.args(["-d", repository.as_str(), "checkout", "-d", name.as_str()]);
        let command = if location.tag.is_empty() {
          command
        } else {
          command.args(["-r", location.tag.as_str()])
        };
        command.arg(module)
      }
      Self::Download => return false,
    };

    if !command.succeeds().await {
      return false;
    }

    // git has no clone-at-tag for arbitrary refs
    if self == Self::Git && !location.tag.is_empty() {
      return LoggedCommand::new(&program)
        .args(["checkout", location.tag.as_str()])
        .current_dir(dest)
        .log(ctx.log)
        .succeeds()
        .await;
    }
    true
  }

  async fn download(self, location: &SourceLocation, dest_dir: &Path, ctx: &FetchContext<'_>) -> bool {
    let url = ctx.hosts.apply(&location.repository);
    let name = super::download::file_name_from_url(&url);

    if ctx.offline {
      info!(url = %url, "offline, skipping download");
      return true;
    }

    match fetch_file(&url, dest_dir, Some(&name), ctx.cache, ctx.log).await {
      Ok(path) => {
        debug!(path = %path.display(), "downloaded");
        true
      }
      Err(e) => {
        warn!(url = %url, error = %e, "download failed");
        false
      }
    }
  }

  fn find_program(self, ctx: &FetchContext<'_>) -> Option<std::path::PathBuf> {
    let found = ctx.cache.find_application(self.program());
    if found.is_none() {
      warn!(program = self.program(), "version control tool not found");
    }
    found
  }

  async fn lock(self, ctx: &FetchContext<'_>) -> Option<ScopedLock> {
    let lock_dir = ctx.lock_dir.to_path_buf();
    let resource = self.lock_resource();
    match tokio::task::spawn_blocking(move || ScopedLock::acquire(&lock_dir, &resource)).await {
      Ok(Ok(lock)) => Some(lock),
      Ok(Err(e)) => {
        warn!(error = %e, "cannot lock checkout");
        None
      }
      Err(e) => {
        warn!(error = %e, "lock task failed");
        None
      }
    }
  }
}
