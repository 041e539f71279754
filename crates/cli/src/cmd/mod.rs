mod batch;
mod classify;
mod fetch;
mod hash;
mod list;
mod manifest;
mod merge;
mod version;

pub use batch::cmd_batch;
pub use classify::cmd_classify;
pub use fetch::cmd_fetch;
pub use hash::cmd_hash;
pub use list::cmd_list;
pub use manifest::{cmd_manifest_record, cmd_manifest_show, cmd_manifest_sync};
pub use merge::{cmd_merge, cmd_unmerge};
pub use version::cmd_version;
