//! Build descriptions.
//!
//! A [`BuildDescription`] is the resolved plan for building one configuration:
//! tool invocations ([`BuildStep`]s) wired into a graph through the files they
//! produce and consume, each marked as needing a build or being up to date.

mod builder;
mod command;
mod freshness;
mod naming;
mod types;

pub use builder::{BuildFlags, DescriptionBuilder};
pub use command::{command_line, option_flags, quote};
pub use freshness::mark_freshness;
pub use naming::NameProvider;
pub use types::{BuildDescription, BuildResource, BuildStep, DescribeError, StepId, StepKind};
