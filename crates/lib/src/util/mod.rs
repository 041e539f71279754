//! Shared utilities.
//!
//! Hashing, atomic file replacement and test helpers.

pub mod fs;
pub mod hash;

#[cfg(test)]
pub mod testutil;
