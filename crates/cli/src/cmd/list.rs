use std::path::Path;

use anyhow::{Context, Result};

use portwright_lib::reconcile::list_checksummed;

use crate::output::{OutputFormat, emit_json};

pub fn cmd_list(dir: &Path, output: OutputFormat) -> Result<()> {
  let listing = list_checksummed(dir).with_context(|| format!("Failed to list {}", dir.display()))?;

  if output.is_json() {
    emit_json(&listing)
  } else {
    for file in &listing {
      println!("{}  {}", file.checksum, file.path);
    }
    Ok(())
  }
}
