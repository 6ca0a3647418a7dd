//! Host platform integration.

pub mod paths;
