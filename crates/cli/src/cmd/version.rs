use anyhow::Result;

use portwright_lib::version;

use crate::output::{OutputFormat, emit_json};

pub fn cmd_version(mut versions: Vec<String>, latest: bool, output: OutputFormat) -> Result<()> {
  version::sort_versions(&mut versions);
  if latest {
    versions = versions.pop().into_iter().collect();
  }

  if output.is_json() {
    emit_json(&versions)
  } else {
    for v in &versions {
      println!("{}", v);
    }
    Ok(())
  }
}
