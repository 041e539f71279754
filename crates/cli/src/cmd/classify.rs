use anyhow::Result;

use portwright_lib::source::SourceLocation;

use crate::output::{OutputFormat, Summary, emit_json};

pub fn cmd_classify(url: &str, output: OutputFormat) -> Result<()> {
  let location = SourceLocation::parse(url);

  if output.is_json() {
    emit_json(&serde_json::json!({
      "kind": location.kind.as_str(),
      "repository": location.repository,
      "branch": location.branch,
      "tag": location.tag,
      "name": location.name(),
    }))
  } else {
    Summary::new()
      .row("Kind", &location.kind)
      .row("Repository", &location.repository)
      .row_if("Branch", Some(&location.branch))
      .row_if("Tag", Some(&location.tag))
      .print();
    Ok(())
  }
}
