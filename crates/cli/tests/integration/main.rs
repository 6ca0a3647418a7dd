mod common;

mod build_tests;
mod project_tests;
