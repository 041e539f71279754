//! Version ordering.
//!
//! Converts arbitrary version strings into a [`VersionKey`] whose lexicographic
//! order matches conventional release order. Numeric runs are zero padded to
//! eight digits, alphabetic runs are prefixed with `*`, and a synthetic
//! `*final` marker is appended so that pre-release tags (`a`, `b`, `c`, `rc`,
//! `dev`, ...) sort before the release itself.
//!
//! ```text
//! 1.0dev < 1.0a1 < 1.0rc1 < 1.0 == 1.0.0 < 1.0-1 < 1.0.1
//! ```
//!
//! A dash introduces a patch level: `2.4-1` is newer than `2.4` but older
//! than `2.4.1`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

const NUMERIC_WIDTH: usize = 8;
const FINAL: &str = "*final";
const FINAL_DASH: &str = "*final-";
const ZERO: &str = "00000000";

static COMPONENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+|[a-z]+|\.|-").expect("valid regex"));

/// Canonical, totally ordered key for a version string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionKey(Vec<String>);

impl VersionKey {
  /// The key's tokens, in order.
  pub fn parts(&self) -> &[String] {
    &self.0
  }
}

impl fmt::Display for VersionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "({})", self.0.join(", "))
  }
}

/// Split a lowercased version into components, keeping the text between
/// recognized components as components of their own.
fn components(version: &str) -> Vec<&str> {
  let mut parts = Vec::new();
  let mut last = 0;
  for m in COMPONENT.find_iter(version) {
    parts.push(&version[last..m.start()]);
    parts.push(m.as_str());
    last = m.end();
  }
  parts.push(&version[last..]);
  parts
}

fn normalize(part: &str) -> &str {
  match part {
    "pre" | "preview" | "rc" => "c",
    "-" => "final-",
    "dev" => "@",
    other => other,
  }
}

/// Compute the canonical key of a version string. Never fails.
pub fn canonical_key(version: &str) -> VersionKey {
  let lowered = version.to_lowercase();

  let tokens = components(&lowered)
    .into_iter()
    .map(normalize)
    .filter(|part| !part.is_empty() && *part != ".")
    .map(|part| {
      if part.starts_with(|c: char| c.is_ascii_digit()) {
        format!("{:0>width$}", part, width = NUMERIC_WIDTH)
      } else {
        format!("*{}", part)
      }
    })
    .chain(std::iter::once(FINAL.to_string()));

  let mut parts: Vec<String> = Vec::new();
  for token in tokens {
    if token.starts_with('*') {
      // a pre-release tag cancels a preceding dash
      if token.as_str() < FINAL {
        while parts.last().is_some_and(|p| p == FINAL_DASH) {
          parts.pop();
        }
      }
      while parts.last().is_some_and(|p| p == ZERO) {
        parts.pop();
      }
    }
    parts.push(token);
  }

  VersionKey(parts)
}

/// Compare two version strings by their canonical keys.
pub fn compare(a: &str, b: &str) -> Ordering {
  canonical_key(a).cmp(&canonical_key(b))
}

/// Pick the newest version from a set of candidates.
pub fn latest<'a, I>(versions: I) -> Option<&'a str>
where
  I: IntoIterator<Item = &'a str>,
{
  versions.into_iter().max_by_key(|v| canonical_key(v))
}

/// Sort versions oldest first.
pub fn sort_versions(versions: &mut [String]) {
  versions.sort_by_cached_key(|v| canonical_key(v));
}
