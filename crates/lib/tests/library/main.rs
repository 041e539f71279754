mod batch_tests;
mod common;
mod manifest_tests;
mod reconcile_tests;
