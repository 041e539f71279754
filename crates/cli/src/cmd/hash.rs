//! Hash command implementation.

use std::path::Path;

use anyhow::{Context, Result};

use portwright_lib::util::hash::{self, HashAlgorithm};

use crate::output::{Mark, OutputFormat, emit_json, status};

/// Print a tagged digest, or check the `.sha1` sidecar. `Ok(false)` on mismatch.
pub fn cmd_hash(file: &Path, algorithm: &str, sidecar: bool, output: OutputFormat) -> Result<bool> {
  if sidecar {
    let verified = hash::verify_sidecar(file);
    if output.is_json() {
      emit_json(&serde_json::json!({ "file": file.display().to_string(), "verified": verified }))?;
    } else {
      match verified {
        Some(true) => status(Mark::Done, &format!("{} matches its sidecar", file.display())),
        Some(false) => status(Mark::Failed, &format!("{} does not match its sidecar", file.display())),
        None => status(Mark::Attention, &format!("No usable sidecar for {}", file.display())),
      }
    }
    return Ok(verified != Some(false));
  }

  let algorithm: HashAlgorithm = algorithm.parse()?;
  let checksum =
    hash::tagged_digest_file(file, algorithm).with_context(|| format!("Failed to hash {}", file.display()))?;

  if output.is_json() {
    emit_json(&serde_json::json!({
      "file": file.display().to_string(),
      "algorithm": algorithm,
      "checksum": checksum,
    }))?;
  } else {
    println!("{}  {}", checksum, file.display());
  }
  Ok(true)
}
