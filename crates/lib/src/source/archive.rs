//! Archive unpacking.
//!
//! Tarballs (plain and gzip) and zip files are unpacked in process. Anything
//! else is handed to `7za`. Files without an extension are not archives and
//! unpack to nothing.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::ToolCache;
use crate::process::LoggedCommand;

const SEVEN_ZIP: &str = "7za";

#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("failed to unpack {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to unpack zip {path}: {source}")]
  Zip {
    path: PathBuf,
    #[source]
    source: zip::result::ZipError,
  },

  #[error("7za is required to unpack {path} but was not found")]
  ToolMissing { path: PathBuf },

  #[error("7za failed to unpack {path}")]
  ToolFailed { path: PathBuf },

  #[error("unpack task panicked: {0}")]
  Join(#[from] tokio::task::JoinError),
}

/// How an archive is unpacked, decided by its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
  Tar,
  TarGz,
  Zip,
  SevenZip,
  /// Any other extension, handled by `7za`'s format detection.
  External,
  /// No extension: nothing to unpack.
  NotAnArchive,
}

impl ArchiveKind {
  pub fn detect(path: &Path) -> Self {
    let name = path
      .file_name()
      .map(|n| n.to_string_lossy().to_lowercase())
      .unwrap_or_default();

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
      Self::TarGz
    } else if name.ends_with(".tar") {
      Self::Tar
    } else if name.ends_with(".zip") {
      Self::Zip
    } else if name.ends_with(".7z") {
      Self::SevenZip
    } else if path.extension().is_none() {
      Self::NotAnArchive
    } else {
      Self::External
    }
  }
}

/// Unpack one archive into `dest`.
pub async fn unpack_file(
  archive: &Path,
  dest: &Path,
  cache: &ToolCache,
  log: Option<&Path>,
) -> Result<(), ArchiveError> {
  let kind = ArchiveKind::detect(archive);
  debug!(path = %archive.display(), ?kind, "unpacking");

  match kind {
    ArchiveKind::NotAnArchive => {
      debug!(path = %archive.display(), "not an archive, nothing to unpack");
      Ok(())
    }
    ArchiveKind::Tar | ArchiveKind::TarGz | ArchiveKind::Zip => {
      let archive = archive.to_path_buf();
      let dest = dest.to_path_buf();
      tokio::task::spawn_blocking(move || unpack_native(&archive, &dest, kind)).await?
    }
    ArchiveKind::SevenZip | ArchiveKind::External => unpack_external(archive, dest, kind, cache, log).await,
  }
}

/// Unpack several archives into the same directory, stopping at the first failure.
pub async fn unpack_files(
  archives: &[PathBuf],
  dest: &Path,
  cache: &ToolCache,
  log: Option<&Path>,
) -> Result<(), ArchiveError> {
  for archive in archives {
    unpack_file(archive, dest, cache, log).await?;
  }
  Ok(())
}

fn unpack_native(archive: &Path, dest: &Path, kind: ArchiveKind) -> Result<(), ArchiveError> {
  let io_err = |source| ArchiveError::Io {
    path: archive.to_path_buf(),
    source,
  };

  std::fs::create_dir_all(dest).map_err(io_err)?;
  let file = File::open(archive).map_err(io_err)?;

  match kind {
    ArchiveKind::TarGz => Archive::new(GzDecoder::new(BufReader::new(file)))
      .unpack(dest)
      .map_err(io_err)?,
    ArchiveKind::Tar => Archive::new(BufReader::new(file)).unpack(dest).map_err(io_err)?,
    _ => zip::ZipArchive::new(BufReader::new(file))
      .and_then(|mut zip| zip.extract(dest))
      .map_err(|source| ArchiveError::Zip {
        path: archive.to_path_buf(),
        source,
      })?,
  }

  info!(path = %archive.display(), dest = %dest.display(), "unpacked");
  Ok(())
}

async fn unpack_external(
  archive: &Path,
  dest: &Path,
  kind: ArchiveKind,
  cache: &ToolCache,
  log: Option<&Path>,
) -> Result<(), ArchiveError> {
  let tool = cache.find_application(SEVEN_ZIP).ok_or_else(|| ArchiveError::ToolMissing {
    path: archive.to_path_buf(),
  })?;

  let mut args = vec!["x".to_string(), "-r".to_string(), "-y".to_string()];
  args.push(format!("-o{}", dest.display()));
  if kind == ArchiveKind::SevenZip {
    args.push("-t7z".to_string());
  }
  if cache.supports_flag(SEVEN_ZIP, "-bs", "--help").await {
    args.push("-bso2".to_string());
    args.push("-bsp1".to_string());
  }

  let ok = LoggedCommand::new(tool).args(&args).arg(archive).log(log).succeeds().await;
  if ok {
    Ok(())
  } else {
    Err(ArchiveError::ToolFailed {
      path: archive.to_path_buf(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::write_tree;
  use flate2::Compression;
  use flate2::write::GzEncoder;
  use std::io::Write;
  use tempfile::tempdir;

  fn build_tar_gz(src: &Path, out: &Path) {
    let file = File::create(out).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all("pkg-1.0", src).unwrap();
    builder.into_inner().unwrap().finish().unwrap();
  }

  #[test]
  fn detects_kind_from_name() {
    assert_eq!(ArchiveKind::detect(Path::new("a-1.0.tar.gz")), ArchiveKind::TarGz);
    assert_eq!(ArchiveKind::detect(Path::new("a-1.0.TGZ")), ArchiveKind::TarGz);
    assert_eq!(ArchiveKind::detect(Path::new("a.tar")), ArchiveKind::Tar);
    assert_eq!(ArchiveKind::detect(Path::new("a.zip")), ArchiveKind::Zip);
    assert_eq!(ArchiveKind::detect(Path::new("a.7z")), ArchiveKind::SevenZip);
    assert_eq!(ArchiveKind::detect(Path::new("a.tar.bz2")), ArchiveKind::External);
    assert_eq!(ArchiveKind::detect(Path::new("README")), ArchiveKind::NotAnArchive);
  }

  #[tokio::test]
  async fn unpacks_tar_gz() {
    let temp = tempdir().unwrap();
    let src = temp.path().join("src");
    write_tree(&src, &[("configure", "#!/bin/sh"), ("lib/a.c", "int a;")]);
    let archive = temp.path().join("pkg-1.0.tar.gz");
    build_tar_gz(&src, &archive);

    let dest = temp.path().join("work");
    let cache = ToolCache::new(temp.path());
    unpack_file(&archive, &dest, &cache, None).await.unwrap();

    assert_eq!(
      std::fs::read_to_string(dest.join("pkg-1.0").join("lib").join("a.c")).unwrap(),
      "int a;"
    );
  }

  #[tokio::test]
  async fn unpacks_zip() {
    let temp = tempdir().unwrap();
    let archive = temp.path().join("data.zip");
    {
      let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
      zip
        .start_file("data/readme.txt", zip::write::SimpleFileOptions::default())
        .unwrap();
      zip.write_all(b"hi").unwrap();
      zip.finish().unwrap();
    }

    let dest = temp.path().join("work");
    let cache = ToolCache::new(temp.path());
    unpack_files(std::slice::from_ref(&archive), &dest, &cache, None)
      .await
      .unwrap();

    assert_eq!(std::fs::read_to_string(dest.join("data/readme.txt")).unwrap(), "hi");
  }

  #[tokio::test]
  async fn extensionless_file_is_noop() {
    let temp = tempdir().unwrap();
    let file = temp.path().join("LICENSE");
    std::fs::write(&file, "text").unwrap();

    let dest = temp.path().join("work");
    let cache = ToolCache::new(temp.path());
    unpack_file(&file, &dest, &cache, None).await.unwrap();
    assert!(!dest.exists());
  }

  #[tokio::test]
  async fn corrupt_tarball_is_error() {
    let temp = tempdir().unwrap();
    let archive = temp.path().join("broken.tar.gz");
    std::fs::write(&archive, "not gzip").unwrap();

    let cache = ToolCache::new(temp.path());
    let result = unpack_file(&archive, &temp.path().join("work"), &cache, None).await;
    assert!(matches!(result, Err(ArchiveError::Io { .. })));
  }
}
