//! Manifest record types and their JSON document form.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp format used throughout the manifest document.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Accepts timestamps with or without fractional seconds.
const PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Date given to entries migrated from legacy documents.
pub fn sentinel_date() -> NaiveDateTime {
  NaiveDate::from_ymd_opt(1, 1, 1)
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .unwrap_or(NaiveDateTime::MIN)
}

/// Current UTC time at the precision the document stores.
pub fn now() -> NaiveDateTime {
  Utc::now().naive_utc().trunc_subsecs(6)
}

pub fn format_timestamp(date: &NaiveDateTime) -> String {
  date.format(TIME_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
  NaiveDateTime::parse_from_str(s, PARSE_FORMAT)
}

pub(crate) mod timestamp {
  use chrono::NaiveDateTime;
  use serde::{Deserialize, Deserializer, Serializer, de};

  pub fn serialize<S: Serializer>(date: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&super::format_timestamp(date))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
    let s = String::deserialize(deserializer)?;
    super::parse_timestamp(&s).map_err(de::Error::custom)
  }
}

/// One recorded build artifact. Never mutated once recorded.
///
/// Fields are declared in alphabetical order so the serialized document has
/// sorted keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntryFile {
  #[serde(default)]
  pub build_prefix: Option<String>,
  pub checksum: String,
  #[serde(with = "timestamp")]
  pub date: NaiveDateTime,
  pub file_name: String,
  #[serde(default)]
  pub options: BTreeMap<String, String>,
  #[serde(default)]
  pub version: String,
}

impl ManifestEntryFile {
  /// A record stamped with the current time.
  pub fn new(file_name: impl Into<String>, checksum: impl Into<String>) -> Self {
    Self {
      build_prefix: None,
      checksum: checksum.into(),
      date: now(),
      file_name: file_name.into(),
      options: BTreeMap::new(),
      version: String::new(),
    }
  }

  pub fn with_version(mut self, version: impl Into<String>) -> Self {
    self.version = version.into();
    self
  }

  pub fn with_build_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.build_prefix = Some(prefix.into());
    self
  }

  pub fn with_options(mut self, options: BTreeMap<String, String>) -> Self {
    self.options = options;
    self
  }

  pub fn with_date(mut self, date: NaiveDateTime) -> Self {
    self.date = date;
    self
  }
}

/// All recorded artifacts of one package under one toolchain, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
  pub files: Vec<ManifestEntryFile>,
  pub name: String,
}

impl ManifestEntry {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      files: Vec::new(),
      name: name.into(),
    }
  }

  /// Record a file, keeping the list sorted newest first.
  pub fn add_file(&mut self, file: ManifestEntryFile) -> &ManifestEntryFile {
    let at = self.files.partition_point(|f| f.date > file.date);
    self.files.insert(at, file);
    &self.files[at]
  }

  /// The most recent record, if any.
  pub fn latest(&self) -> Option<&ManifestEntryFile> {
    self.files.first()
  }

  /// Restore the newest-first order after deserialization.
  pub(crate) fn sort_files(&mut self) {
    self.files.sort_by(|a, b| b.date.cmp(&a.date));
  }
}

/// Current-schema document: `packages` maps a toolchain to a list of entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ManifestDocument {
  #[serde(with = "timestamp")]
  pub date: NaiveDateTime,
  #[serde(default)]
  pub origin: Option<String>,
  #[serde(default)]
  pub packages: BTreeMap<String, Vec<ManifestEntry>>,
  pub version: u32,
}

/// Legacy document: `{package: {fileName: {checksum}}}`.
pub(crate) type LegacyDocument = BTreeMap<String, BTreeMap<String, LegacyFile>>;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LegacyFile {
  pub checksum: String,
}
