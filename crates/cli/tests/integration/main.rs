mod batch_tests;
mod common;
mod fetch_tests;
mod manifest_tests;
mod reconcile_tests;
