//! Build description graph.
//!
//! Steps are nodes; an edge runs from the step producing a resource to every
//! step consuming it. The graph must be acyclic: a cycle means the tool
//! definitions feed each other and is reported before anything runs.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use thiserror::Error;

use crate::resource::ResourceError;

/// Errors constructing a build description.
#[derive(Debug, Error)]
pub enum DescribeError {
  #[error("configuration {0} has no tool-chain")]
  NoToolChain(String),

  #[error("build graph cycle involving {}", .0.join(", "))]
  BuildGraphCycle(Vec<String>),

  #[error("{path} is produced by both {first} and {second}")]
  DuplicateOutput {
    path: String,
    first: String,
    second: String,
  },

  #[error(transparent)]
  Resource(#[from] ResourceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StepId(pub usize);

impl fmt::Display for StepId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
  /// One invocation per input file (compile).
  Single,
  /// One invocation for all inputs of a type (link, archive).
  Multi,
}

/// One resolved tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStep {
  pub id: StepId,
  /// Extension ID of the tool.
  pub tool: String,
  pub tool_name: String,
  pub kind: StepKind,
  /// Inputs passed on the command line.
  pub inputs: Vec<String>,
  /// Inputs that only affect freshness.
  pub dependencies: Vec<String>,
  pub outputs: Vec<String>,
  pub command: String,
  pub needs_rebuild: bool,
}

impl BuildStep {
  pub fn all_inputs(&self) -> impl Iterator<Item = &String> {
    self.inputs.iter().chain(self.dependencies.iter())
  }
}

/// A file known to the description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildResource {
  pub path: String,
  pub producer: Option<StepId>,
  pub consumers: Vec<StepId>,
}

impl BuildResource {
  pub fn is_generated(&self) -> bool {
    self.producer.is_some()
  }
}

/// The executable build plan for one configuration.
#[derive(Debug, Clone)]
pub struct BuildDescription {
  pub configuration: String,
  /// Build directory, relative to the working directory.
  pub build_dir: String,
  pub working_dir: PathBuf,
  pub environment: BTreeMap<String, String>,
  /// Previously built outputs no step produces anymore.
  pub stale_outputs: Vec<String>,
  steps: Vec<BuildStep>,
  resources: BTreeMap<String, BuildResource>,
  graph: DiGraph<StepId, ()>,
  order: Vec<StepId>,
}

impl BuildDescription {
  /// Wire steps into a graph through the resources they share.
  ///
  /// Step IDs are reassigned to match their position in `steps`.
  pub fn assemble(
    configuration: impl Into<String>,
    build_dir: impl Into<String>,
    working_dir: PathBuf,
    mut steps: Vec<BuildStep>,
  ) -> Result<Self, DescribeError> {
    let mut resources: BTreeMap<String, BuildResource> = BTreeMap::new();
    let mut graph = DiGraph::new();
    let mut nodes: HashMap<StepId, NodeIndex> = HashMap::new();

    for (i, step) in steps.iter_mut().enumerate() {
      step.id = StepId(i);
      nodes.insert(step.id, graph.add_node(step.id));
    }

    for step in &steps {
      for output in &step.outputs {
        let resource = resources.entry(output.clone()).or_insert_with(|| BuildResource {
          path: output.clone(),
          ..Default::default()
        });
        if let Some(first) = resource.producer {
          return Err(DescribeError::DuplicateOutput {
            path: output.clone(),
            first: steps[first.0].tool.clone(),
            second: step.tool.clone(),
          });
        }
        resource.producer = Some(step.id);
      }
    }

    for step in &steps {
      for input in step.all_inputs() {
        let resource = resources.entry(input.clone()).or_insert_with(|| BuildResource {
          path: input.clone(),
          ..Default::default()
        });
        if !resource.consumers.contains(&step.id) {
          resource.consumers.push(step.id);
        }
        if let Some(producer) = resource.producer
          && graph.find_edge(nodes[&producer], nodes[&step.id]).is_none()
        {
          graph.add_edge(nodes[&producer], nodes[&step.id], ());
        }
      }
    }

    let order = toposort(&graph, None)
      .map_err(|cycle| DescribeError::BuildGraphCycle(vec![steps[graph[cycle.node_id()].0].tool.clone()]))?
      .into_iter()
      .map(|idx| graph[idx])
      .collect();

    Ok(Self {
      configuration: configuration.into(),
      build_dir: build_dir.into(),
      working_dir,
      environment: BTreeMap::new(),
      stale_outputs: Vec::new(),
      steps,
      resources,
      graph,
      order,
    })
  }

  pub fn steps(&self) -> &[BuildStep] {
    &self.steps
  }

  pub fn step(&self, id: StepId) -> &BuildStep {
    &self.steps[id.0]
  }

  pub(crate) fn step_mut(&mut self, id: StepId) -> &mut BuildStep {
    &mut self.steps[id.0]
  }

  pub fn resources(&self) -> &BTreeMap<String, BuildResource> {
    &self.resources
  }

  pub fn resource(&self, path: &str) -> Option<&BuildResource> {
    self.resources.get(path)
  }

  /// Steps in dependency order.
  pub fn topological_order(&self) -> &[StepId] {
    &self.order
  }

  /// Steps producing this step's inputs.
  pub fn dependencies(&self, id: StepId) -> Vec<StepId> {
    self.neighbors(id, Direction::Incoming)
  }

  /// Steps consuming this step's outputs.
  pub fn dependents(&self, id: StepId) -> Vec<StepId> {
    self.neighbors(id, Direction::Outgoing)
  }

  fn neighbors(&self, id: StepId, direction: Direction) -> Vec<StepId> {
    let mut ids: Vec<StepId> = self
      .graph
      .neighbors_directed(NodeIndex::new(id.0), direction)
      .map(|idx| self.graph[idx])
      .collect();
    ids.sort();
    ids
  }

  pub fn needs_build_count(&self) -> usize {
    self.steps.iter().filter(|s| s.needs_rebuild).count()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }
}
