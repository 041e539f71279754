//! Host platform and toolchain identity.
//!
//! A [`Toolchain`] names the active compiler/architecture combination and is
//! the top-level namespace of a build manifest, e.g. `"linux-x86_64-gcc"`.

pub mod paths;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operating systems packages are built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  MacOs,
  Windows,
  FreeBsd,
}

impl Os {
  /// Detect the running operating system.
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      "windows" => Some(Self::Windows),
      "freebsd" => Some(Self::FreeBsd),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "macos",
      Self::Windows => "windows",
      Self::FreeBsd => "freebsd",
    }
  }

  /// Compiler family a toolchain defaults to on this OS.
  pub fn default_compiler(self) -> &'static str {
    match self {
      Self::Windows => "msvc",
      Self::MacOs | Self::FreeBsd => "clang",
      Self::Linux => "gcc",
    }
  }

  /// Executable suffixes to try when locating a tool by hand.
  pub fn executable_suffixes(self) -> &'static [&'static str] {
    match self {
      Self::Windows => &["", ".exe", ".bat"],
      _ => &[""],
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// The compiler/architecture identity builds are recorded under.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Toolchain(String);

impl Toolchain {
  pub fn new(identity: impl Into<String>) -> Self {
    Self(identity.into())
  }

  /// Build the identity from its parts: `<os>-<arch>-<compiler>`.
  pub fn from_parts(os: &str, arch: &str, compiler: &str) -> Self {
    Self(format!("{}-{}-{}", os, arch, compiler))
  }

  /// The toolchain of the running host with its default compiler.
  pub fn host() -> Self {
    let os = Os::current();
    Self::from_parts(
      os.map_or(std::env::consts::OS, Os::as_str),
      std::env::consts::ARCH,
      os.map_or("cc", Os::default_compiler),
    )
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Toolchain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for Toolchain {
  fn from(s: &str) -> Self {
    Self::new(s)
  }
}
