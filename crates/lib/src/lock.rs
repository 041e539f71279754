//! Scoped exclusive file locks keyed by a logical resource id.
//!
//! Checkouts into the shared install root take a lock named after the
//! backend (e.g. `SVN`). The lock file records the holder's pid and is
//! released when the [`ScopedLock`] is dropped, on every exit path.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const LOCK_METADATA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub resource: String,
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "{resource} is locked by another process (PID {pid}, started at Unix timestamp {started_at_unix})\n\
             If you're sure no portwright process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    resource: String,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error(
    "{resource} is locked (could not read lock metadata)\n\
             If you're sure no portwright process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { resource: String, lock_path: PathBuf },

  #[error("failed to create lock directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// An exclusive lock held until drop.
#[derive(Debug)]
pub struct ScopedLock {
  file: File,
  lock_path: PathBuf,
  resource: String,
}

impl ScopedLock {
  /// Block until the lock for `resource` is acquired.
  pub fn acquire(lock_dir: &Path, resource: &str) -> Result<Self, LockError> {
    Self::open(lock_dir, resource, true)
  }

  /// Acquire without waiting; fails with [`LockError::Contention`] when held.
  pub fn try_acquire(lock_dir: &Path, resource: &str) -> Result<Self, LockError> {
    Self::open(lock_dir, resource, false)
  }

  fn open(lock_dir: &Path, resource: &str, wait: bool) -> Result<Self, LockError> {
    let lock_path = lock_dir.join(format!("{}.lock", resource));

    if !lock_dir.exists() {
      std::fs::create_dir_all(lock_dir).map_err(LockError::CreateDir)?;
    }

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(LockError::OpenFile)?;

    if let Err(err) = lock_exclusive(&file, wait) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(read_contention_error(&lock_path, resource));
      }
      return Err(LockError::LockFailed(err));
    }

    write_metadata(&file, resource)?;
    debug!(resource, path = %lock_path.display(), "lock acquired");

    Ok(Self {
      file,
      lock_path,
      resource: resource.to_string(),
    })
  }

  /// Reads the lock metadata from the held file handle.
  ///
  /// Opening a second handle would fail on Windows due to mandatory locking.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }

  pub fn resource(&self) -> &str {
    &self.resource
  }
}

impl Drop for ScopedLock {
  fn drop(&mut self) {
    // The OS lock goes with the handle; clear the holder record first.
    let _ = self.file.set_len(0);
    debug!(resource = %self.resource, "lock released");
  }
}

fn write_metadata(file: &File, resource: &str) -> Result<(), LockError> {
  let metadata = LockMetadata {
    version: LOCK_METADATA_VERSION,
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    resource: resource.to_string(),
  };

  file.set_len(0).map_err(LockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata).map_err(|e| LockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(LockError::WriteMetadata)?;

  Ok(())
}

fn read_contention_error(lock_path: &Path, resource: &str) -> LockError {
  if let Ok(mut file) = File::open(lock_path) {
    let mut contents = String::new();
    if file.read_to_string(&mut contents).is_ok()
      && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
    {
      return LockError::Contention {
        resource: resource.to_string(),
        pid: metadata.pid,
        started_at_unix: metadata.started_at_unix,
        lock_path: lock_path.to_path_buf(),
      };
    }
  }

  LockError::ContentionUnknown {
    resource: resource.to_string(),
    lock_path: lock_path.to_path_buf(),
  }
}

#[cfg(unix)]
fn lock_exclusive(file: &File, wait: bool) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = if wait {
    FlockOperation::LockExclusive
  } else {
    FlockOperation::NonBlockingLockExclusive
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn lock_exclusive(file: &File, wait: bool) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = if wait {
    LOCKFILE_EXCLUSIVE_LOCK
  } else {
    LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK
  };

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized.
  // LockFileEx is safe to call with a valid file handle and zeroed OVERLAPPED.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    let err = io::Error::last_os_error();
    // ERROR_LOCK_VIOLATION
    if err.raw_os_error() == Some(33) {
      return Err(io::Error::from(io::ErrorKind::WouldBlock));
    }
    Err(err)
  } else {
    Ok(())
  }
}
