//! Source acquisition.
//!
//! A recipe URL is classified into a [`VcsKind`], parsed into a
//! [`SourceLocation`], rewritten through the [`HostSubstitutions`] table and
//! handed to the matching [`SourceBackend`].

pub mod archive;
pub mod backend;
pub mod download;
pub mod hosts;
pub mod url;

pub use backend::{FetchContext, SourceBackend};
pub use hosts::{HostRule, HostSubstitutions};
pub use url::{SourceLocation, VcsKind, classify, split_compound_url};
