//! Hashing utilities for artifact verification and digest-gated file removal.
//!
//! This module provides:
//! - `HashAlgorithm`: the supported digests, each with a stable string prefix
//! - `digest_file()`: streaming digest of a single file
//! - `tagged_digest_file()`: prefix + hex digest, the form stored in manifests
//! - `current_digest_like()`: digest a file the same way a recorded checksum was produced
//! - `verify_sidecar()`: validate an archive against its `.sha1` sidecar file
//!
//! # Tagged checksums
//!
//! A tagged checksum is the algorithm prefix followed by the lowercase hex digest,
//! e.g. `"[SHA256]9f86d0..."`. Checksums recorded before tagging existed carry no
//! prefix and are implicitly [`HashAlgorithm::LEGACY`].

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use md5::Md5;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use tracing::debug;

use crate::consts::HASH_CHUNK_SIZE;

/// Digest algorithms known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
  Md5,
  Sha1,
  Sha256,
  Sha512,
}

impl HashAlgorithm {
  /// All algorithms, in prefix lookup order.
  pub const ALL: [HashAlgorithm; 4] = [Self::Md5, Self::Sha1, Self::Sha256, Self::Sha512];

  /// Algorithm assumed for checksums that carry no prefix.
  pub const LEGACY: HashAlgorithm = Self::Md5;

  /// Algorithm used for newly listed image files.
  pub const DEFAULT: HashAlgorithm = Self::Sha256;

  /// The stable prefix identifying this algorithm in a tagged checksum.
  pub fn prefix(self) -> &'static str {
    match self {
      Self::Md5 => "[MD5]",
      Self::Sha1 => "[SHA1]",
      Self::Sha256 => "[SHA256]",
      Self::Sha512 => "[SHA512]",
    }
  }

  /// Lowercase name, e.g. `"sha256"`.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Md5 => "md5",
      Self::Sha1 => "sha1",
      Self::Sha256 => "sha256",
      Self::Sha512 => "sha512",
    }
  }

  /// Length of the hex digest this algorithm produces.
  pub fn hex_len(self) -> usize {
    match self {
      Self::Md5 => 32,
      Self::Sha1 => 40,
      Self::Sha256 => 64,
      Self::Sha512 => 128,
    }
  }

  /// Find the algorithm a tagged checksum was produced with.
  ///
  /// Returns `None` for untagged (legacy) checksums.
  pub fn from_prefix(tagged: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|alg| tagged.starts_with(alg.prefix()))
  }

  /// Prepend this algorithm's prefix to a hex digest.
  pub fn tag(self, hex_digest: &str) -> String {
    format!("{}{}", self.prefix(), hex_digest)
  }
}

impl fmt::Display for HashAlgorithm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl FromStr for HashAlgorithm {
  type Err = HashError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "md5" => Ok(Self::Md5),
      "sha1" => Ok(Self::Sha1),
      "sha256" => Ok(Self::Sha256),
      "sha512" => Ok(Self::Sha512),
      _ => Err(HashError::UnknownAlgorithm(s.to_string())),
    }
  }
}

/// Errors during hashing.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
  #[error("failed to read file {path}: {source}")]
  ReadFile {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("unknown hash algorithm: {0}")]
  UnknownAlgorithm(String),
}

/// Hash a file's contents with the given algorithm.
///
/// The file is streamed through the digest in fixed-size chunks, it is never
/// loaded into memory as a whole. Returns the lowercase hex digest.
pub fn digest_file(path: &Path, algorithm: HashAlgorithm) -> Result<String, HashError> {
  match algorithm {
    HashAlgorithm::Md5 => stream_digest::<Md5>(path),
    HashAlgorithm::Sha1 => stream_digest::<Sha1>(path),
    HashAlgorithm::Sha256 => stream_digest::<Sha256>(path),
    HashAlgorithm::Sha512 => stream_digest::<Sha512>(path),
  }
}

fn stream_digest<D: Digest>(path: &Path) -> Result<String, HashError> {
  let read_err = |source| HashError::ReadFile {
    path: path.to_path_buf(),
    source,
  };

  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut hasher = D::new();
  let mut buffer = [0u8; HASH_CHUNK_SIZE];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(read_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(hex::encode(hasher.finalize()))
}

/// Hash a file and return the tagged checksum (`prefix + hex`).
pub fn tagged_digest_file(path: &Path, algorithm: HashAlgorithm) -> Result<String, HashError> {
  Ok(algorithm.tag(&digest_file(path, algorithm)?))
}

/// Digest a file in the same form as `recorded`.
///
/// Tagged checksums are recomputed with their algorithm and returned tagged.
/// Untagged checksums are recomputed with the legacy algorithm and returned
/// untagged. An unreadable file yields an empty string, meaning "no digest
/// available".
pub fn current_digest_like(path: &Path, recorded: &str) -> String {
  let result = match HashAlgorithm::from_prefix(recorded) {
    Some(algorithm) => tagged_digest_file(path, algorithm),
    None => digest_file(path, HashAlgorithm::LEGACY),
  };

  result.unwrap_or_else(|e| {
    debug!(path = %path.display(), error = %e, "no digest available");
    String::new()
  })
}

/// Check a file against an expected hex digest (tagged or bare).
///
/// Comparison is case-insensitive. Returns `false` if the file cannot be read.
pub fn verify_file(path: &Path, expected: &str, algorithm: HashAlgorithm) -> bool {
  let expected = expected.strip_prefix(algorithm.prefix()).unwrap_or(expected);
  match digest_file(path, algorithm) {
    Ok(actual) => actual.eq_ignore_ascii_case(expected.trim()),
    Err(e) => {
      debug!(path = %path.display(), error = %e, "cannot verify digest");
      false
    }
  }
}

static SHA1_HEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[0-9a-fA-F]{40}\b").expect("valid regex"));

/// Extract the first 40-hex-character SHA-1 digest from sidecar text.
pub fn extract_sha1(text: &str) -> Option<String> {
  SHA1_HEX.find(text).map(|m| m.as_str().to_ascii_lowercase())
}

/// Path of the `.sha1` sidecar belonging to `archive`.
pub fn sidecar_path(archive: &Path) -> PathBuf {
  let mut name = archive.as_os_str().to_os_string();
  name.push(".sha1");
  PathBuf::from(name)
}

/// Validate an archive against its `.sha1` sidecar.
///
/// Returns `None` when there is no readable sidecar or it contains no digest,
/// otherwise whether the archive's SHA-1 matches.
pub fn verify_sidecar(archive: &Path) -> Option<bool> {
  let text = fs::read_to_string(sidecar_path(archive)).ok()?;
  let expected = extract_sha1(&text)?;
  Some(verify_file(archive, &expected, HashAlgorithm::Sha1))
}
