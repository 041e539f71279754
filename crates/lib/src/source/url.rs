//! Source URL taxonomy.
//!
//! Recipes hand out plain strings; this module decides which backend applies
//! and splits compound `server-path|branch|tag` URLs. Parsing never fails,
//! anything unrecognized is a plain download.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consts::COMPOUND_URL_DELIMITER;

/// Version control kinds a source location can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
  Git,
  Svn,
  Hg,
  Cvs,
  /// Not under version control: a downloadable archive.
  None,
}

impl VcsKind {
  /// Kinds that may be named by an explicit `[kind]` tag.
  const TAGGED: [VcsKind; 4] = [Self::Git, Self::Hg, Self::Svn, Self::Cvs];

  /// Lowercase name; empty for [`VcsKind::None`].
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Git => "git",
      Self::Svn => "svn",
      Self::Hg => "hg",
      Self::Cvs => "cvs",
      Self::None => "",
    }
  }

  fn tag(self) -> String {
    format!("[{}]", self.as_str())
  }

  pub fn is_vcs(self) -> bool {
    self != Self::None
  }
}

impl fmt::Display for VcsKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::None => f.write_str("download"),
      kind => f.write_str(kind.as_str()),
    }
  }
}

/// Decide which backend handles `url`.
///
/// Rules, first match wins:
/// 1. an explicit `[git]`, `[hg]`, `[svn]` or `[cvs]` tag
/// 2. a `git://` scheme, or a repository part ending in `.git`
/// 3. no `://` at all (svn relative path)
/// 4. `svn:`, `http:` or `https:` tokens (svn)
/// 5. a `pserver:` token (cvs)
///
/// A bare `:pserver:` root has no `://` and so lands on svn; tag it `[cvs]`.
///
/// Everything else, including the empty string, is [`VcsKind::None`].
pub fn classify(url: &str) -> VcsKind {
  if url.is_empty() {
    return VcsKind::None;
  }

  if let Some(kind) = VcsKind::TAGGED.into_iter().find(|k| url.starts_with(&k.tag())) {
    return kind;
  }

  let repository = url.split(COMPOUND_URL_DELIMITER).next().unwrap_or_default();
  if url.starts_with("git://") || repository.ends_with(".git") {
    return VcsKind::Git;
  }

  if !url.contains("://") {
    return VcsKind::Svn;
  }

  if ["svn:", "http:", "https:"].iter().any(|token| url.contains(token)) {
    return VcsKind::Svn;
  }

  if url.contains("pserver:") {
    return VcsKind::Cvs;
  }

  VcsKind::None
}

/// Remove a leading `[kind]` tag, if any.
pub fn strip_kind_tag(url: &str) -> &str {
  VcsKind::TAGGED
    .into_iter()
    .find_map(|k| url.strip_prefix(k.tag().as_str()))
    .unwrap_or(url)
}

/// Split a compound URL into exactly `(repository, branch, tag)`.
///
/// Missing fields are empty strings; fields past the third are dropped.
pub fn split_compound_url(url: &str) -> (String, String, String) {
  let mut fields = url.splitn(4, COMPOUND_URL_DELIMITER).map(String::from);
  let repository = fields.next().unwrap_or_default();
  let branch = fields.next().unwrap_or_default();
  let tag = fields.next().unwrap_or_default();
  (repository, branch, tag)
}

/// Parsed form of a recipe-provided source URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
  pub kind: VcsKind,
  /// Server and path, with any kind tag removed.
  pub repository: String,
  /// Branch name or ref; empty for the default.
  pub branch: String,
  /// Tag or revision; empty for the tip.
  pub tag: String,
}

impl SourceLocation {
  /// Parse a URL. Total: unknown forms become plain downloads.
  pub fn parse(url: &str) -> Self {
    let kind = classify(url);
    let (repository, branch, tag) = match kind {
      VcsKind::None => (url.to_string(), String::new(), String::new()),
      _ => split_compound_url(strip_kind_tag(url)),
    };
    Self {
      kind,
      repository,
      branch,
      tag,
    }
  }

  /// Last path component of the repository, without a `.git` suffix.
  ///
  /// Used as the checkout directory name.
  pub fn name(&self) -> &str {
    let trimmed = self.repository.trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last)
  }
}

impl fmt::Display for SourceLocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.repository)?;
    if !self.branch.is_empty() || !self.tag.is_empty() {
      write!(f, "|{}|{}", self.branch, self.tag)?;
    }
    Ok(())
  }
}
