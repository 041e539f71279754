//! portwright-lib: engine of the portwright source-based package manager
//!
//! This crate provides the pieces that sit beneath the package recipes:
//! - `BuildManifest`: versioned, mergeable record of what has been built
//! - `SourceBackend`: uniform fetch/update contract over git, svn, hg, cvs and plain downloads
//! - `reconcile`: digest-gated merge/unmerge of image directories into the install root
//! - `Orchestrator`: sweep-based batch pipeline with per-package fault isolation

pub mod cache;
pub mod config;
pub mod consts;
pub mod lock;
pub mod manifest;
pub mod notify;
pub mod pipeline;
pub mod platform;
pub mod process;
pub mod recipe;
pub mod reconcile;
pub mod source;
pub mod util;
pub mod version;
