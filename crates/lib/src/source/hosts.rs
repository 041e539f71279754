//! Host substitution for mirrored and internal repositories.
//!
//! Before any network operation a source URL is rewritten through a table of
//! `(host, replace)` rules. The first rule whose host occurs in the URL is
//! applied (to every occurrence) and the search stops.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::PLACEHOLDER_SVN_USERNAME;

/// Anonymous KDE git URLs switch to the authenticated form for account holders.
const LEGACY_KDE_HOST: &str = "git://git.kde.org/";
const LEGACY_KDE_REPLACE: &str = "git@git.kde.org:";

#[derive(Debug, Error)]
pub enum HostsError {
  #[error("failed to read host table {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse host table {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRule {
  pub host: String,
  pub replace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSubstitutions {
  #[serde(default)]
  pub rules: Vec<HostRule>,
}

impl HostSubstitutions {
  pub fn new(rules: Vec<HostRule>) -> Self {
    Self { rules }
  }

  /// Load the table from a JSON file. A missing file is an empty table.
  pub fn load(path: &Path) -> Result<Self, HostsError> {
    if !path.exists() {
      debug!(path = %path.display(), "no host table");
      return Ok(Self::default());
    }

    let content = std::fs::read_to_string(path).map_err(|source| HostsError::Read {
      path: path.display().to_string(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| HostsError::Parse {
      path: path.display().to_string(),
      source,
    })
  }

  /// Append the legacy KDE rule when a real svn account is configured.
  pub fn with_account(mut self, svn_username: Option<&str>) -> Self {
    if let Some(user) = svn_username
      && !user.is_empty()
      && user != PLACEHOLDER_SVN_USERNAME
    {
      self.rules.push(HostRule {
        host: LEGACY_KDE_HOST.to_string(),
        replace: LEGACY_KDE_REPLACE.to_string(),
      });
    }
    self
  }

  /// Rewrite `url` with the first matching rule.
  pub fn apply(&self, url: &str) -> String {
    match self.rules.iter().find(|rule| url.contains(&rule.host)) {
      Some(rule) => {
        let rewritten = url.replace(&rule.host, &rule.replace);
        debug!(from = %url, to = %rewritten, "host substituted");
        rewritten
      }
      None => url.to_string(),
    }
  }
}
