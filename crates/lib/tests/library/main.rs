//! End-to-end scenarios: manifests to project to description to execution.

mod common;

mod build_tests;
mod project_tests;
