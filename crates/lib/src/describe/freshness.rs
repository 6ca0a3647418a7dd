//! Up-to-date marking.

use std::collections::BTreeSet;

use tracing::trace;

use crate::resource::{ResourceDelta, ResourceProvider};
use crate::state::BuildState;

use super::types::BuildDescription;

/// Mark every step as needing a build or not.
///
/// A step is up to date only when all of these hold: the build is not
/// forced, no step producing one of its inputs needs a build, none of its
/// inputs is in the delta as added or changed, and every output exists with
/// a recorded input set and signatures matching the current inputs.
pub fn mark_freshness(
  desc: &mut BuildDescription,
  state: &BuildState,
  delta: &ResourceDelta,
  provider: &dyn ResourceProvider,
  force: bool,
) {
  let order = desc.topological_order().to_vec();

  for id in order {
    let dirty_dependency = desc.dependencies(id).iter().any(|dep| desc.step(*dep).needs_rebuild);
    let step = desc.step(id);

    let needs_rebuild = force
      || dirty_dependency
      || step.all_inputs().any(|input| delta.is_dirty(input))
      || step.outputs.iter().any(|output| output_is_stale(output, step.all_inputs(), state, provider));

    trace!(step = %id, tool = %step.tool, needs_rebuild, "freshness");
    desc.step_mut(id).needs_rebuild = needs_rebuild;
  }

  let produced: BTreeSet<&String> = desc.steps().iter().flat_map(|s| s.outputs.iter()).collect();
  desc.stale_outputs = state
    .resources
    .keys()
    .filter(|output| !produced.contains(output))
    .cloned()
    .collect();
}

fn output_is_stale<'a>(
  output: &str,
  inputs: impl Iterator<Item = &'a String>,
  state: &BuildState,
  provider: &dyn ResourceProvider,
) -> bool {
  if !provider.exists(output) {
    return true;
  }
  let Some(record) = state.record(output) else {
    return true;
  };

  let inputs: BTreeSet<&String> = inputs.collect();
  if inputs.len() != record.inputs.len() {
    return true;
  }
  inputs.into_iter().any(|input| match record.inputs.get(input) {
    Some(recorded) => provider.signature(input).as_ref() != Some(recorded),
    None => true,
  })
}
