//! Filesystem helpers.

use std::fs;
use std::io;
use std::path::Path;

/// Write `content` to `path` by writing a sibling temp file and renaming it.
///
/// Concurrent readers see either the old or the new file, never a partial one.
pub fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent)?;
  }

  let mut temp_name = path.as_os_str().to_os_string();
  temp_name.push(".tmp");
  let temp_path = Path::new(&temp_name);

  fs::write(temp_path, content)?;
  fs::rename(temp_path, path)
}
