//! mbs-lib: managed build model engine.
//!
//! This crate turns declarative tool descriptions into builds:
//! - `model`: extension objects from manifests, with inheritance resolved
//! - `project`: a project's copy of its tool chains plus option values
//! - `describe`: the build description graph for one configuration
//! - `execute`: running that graph incrementally and in parallel
//! - `state`: what the last build produced, for up-to-date checks

pub mod consts;
pub mod describe;
pub mod execute;
pub mod lock;
pub mod manifest;
pub mod model;
pub mod platform;
pub mod project;
pub mod resource;
pub mod state;
pub mod util;
