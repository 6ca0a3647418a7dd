//! Build description construction.
//!
//! Sources go to the first single-input tool accepting their extension.
//! Generated files then follow their output type's build variable into a
//! multi-input tool (link, archive), or chain into another single-input tool
//! by extension. Multi-input steps are created last, in tool dependency order,
//! so every input they collect is known by the time they are planned.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::DiGraph;
use tracing::{debug, trace, warn};

use crate::model::{ConfigurationView, ModelView, NatureFilter, ObjectRef, ToolView};
use crate::project::{Nature, ProjectModel};
use crate::resource::{ResourceDelta, ResourceProvider};
use crate::state::BuildState;

use super::command::command_line;
use super::freshness::mark_freshness;
use super::naming::{self, NameProvider, NameProviders, artifact_name};
use super::types::{BuildDescription, BuildStep, DescribeError, StepId, StepKind};

/// How many tools a generated file may pass through.
const MAX_CHAIN_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildFlags {
  /// Treat every step as out of date.
  pub rebuild: bool,
  /// Emit dependency files from tools that declare an extension for them.
  pub depfiles: bool,
}

/// Turns a configuration into a [`BuildDescription`].
pub struct DescriptionBuilder<'a> {
  project: &'a ProjectModel,
  providers: NameProviders,
}

impl<'a> DescriptionBuilder<'a> {
  pub fn new(project: &'a ProjectModel) -> Self {
    Self {
      project,
      providers: HashMap::new(),
    }
  }

  /// Register the provider an output type names with `nameProvider`.
  pub fn with_name_provider(mut self, id: impl Into<String>, provider: Arc<dyn NameProvider>) -> Self {
    self.providers.insert(id.into(), provider);
    self
  }

  pub fn build(
    &self,
    configuration: ObjectRef,
    state: &BuildState,
    delta: &ResourceDelta,
    provider: &dyn ResourceProvider,
    flags: BuildFlags,
  ) -> Result<BuildDescription, DescribeError> {
    let project = self.project;
    let cfg = ConfigurationView::new(project, configuration);
    let tool_chain = cfg
      .tool_chain()
      .ok_or_else(|| DescribeError::NoToolChain(cfg.id().to_string()))?;

    let tools = applicable_tools(project, configuration);
    let order = order_tools(project, &tools)?;
    let target = tool_chain
      .target_tool()
      .map(|t| t.r)
      .filter(|t| tools.contains(t));

    let (multi, single): (Vec<ObjectRef>, Vec<ObjectRef>) = tools.iter().copied().partition(|&t| {
      Some(t) == target || ToolView::new(project, t).input_types().iter().any(|i| i.multiple_of_type())
    });

    let build_dir = cfg.build_dir().trim_end_matches('/').to_string();
    let mut planner = Planner {
      project,
      providers: &self.providers,
      configuration,
      build_dir: build_dir.clone(),
      flags,
      single,
      multi,
      pending: HashMap::new(),
      steps: Vec::new(),
    };

    for source in provider.sources()? {
      if delta.removed.contains(&source) || planner.is_build_output(&source) {
        continue;
      }
      if project.is_excluded(configuration, &source) {
        debug!(path = %source, "excluded from build");
        continue;
      }
      planner.route(&source, None, None, 0);
    }

    let artifact = cfg.artifact_name().unwrap_or(project.name());
    for tool in order {
      if planner.multi.contains(&tool) {
        planner.multi_step(tool, target == Some(tool), artifact, cfg.artifact_extension());
      }
    }

    let mut desc = BuildDescription::assemble(cfg.id(), build_dir, provider.root().to_path_buf(), planner.steps)?;
    desc.environment = cfg.environment();

    let force = flags.rebuild || project.needs_rebuild(configuration);
    mark_freshness(&mut desc, state, delta, provider, force);

    debug!(
      configuration = %desc.configuration,
      steps = desc.steps().len(),
      needs_build = desc.needs_build_count(),
      force,
      "build description ready"
    );
    Ok(desc)
  }
}

#[derive(Default)]
struct PendingInputs {
  inputs: Vec<String>,
  input_types: Vec<ObjectRef>,
}

struct Planner<'a, 'p> {
  project: &'a ProjectModel,
  providers: &'p NameProviders,
  configuration: ObjectRef,
  build_dir: String,
  flags: BuildFlags,
  single: Vec<ObjectRef>,
  multi: Vec<ObjectRef>,
  pending: HashMap<ObjectRef, PendingInputs>,
  steps: Vec<BuildStep>,
}

impl<'a> Planner<'a, '_> {
  /// Send a file to the tool consuming it.
  fn route(&mut self, path: &str, variable: Option<&str>, producer: Option<ObjectRef>, depth: usize) {
    let project = self.project;
    let ext = extension(path);

    if let Some(variable) = variable {
      let consumer = self.multi.iter().copied().find_map(|t| {
        (Some(t) != producer)
          .then(|| ToolView::new(project, t).input_type_for_variable(variable))
          .flatten()
          .map(|input| (t, input.r))
      });
      if let Some((tool, input_type)) = consumer {
        self.add_pending(tool, path, input_type);
        return;
      }
    }

    let single = self
      .single
      .iter()
      .copied()
      .find(|&t| Some(t) != producer && ToolView::new(project, t).builds_file_type(ext));
    if let Some(tool) = single {
      if depth < MAX_CHAIN_DEPTH {
        self.single_step(tool, path, depth);
        return;
      }
      warn!(path, tool = ToolView::new(project, tool).id(), "tool chain too deep; resource not built");
    }

    let consumer = self.multi.iter().copied().find_map(|t| {
      (Some(t) != producer)
        .then(|| ToolView::new(project, t).input_type_for_extension(ext))
        .flatten()
        .map(|input| (t, input.r))
    });
    match consumer {
      Some((tool, input_type)) => self.add_pending(tool, path, input_type),
      None => trace!(path, "no tool consumes resource"),
    }
  }

  fn add_pending(&mut self, tool: ObjectRef, path: &str, input_type: ObjectRef) {
    let pending = self.pending.entry(tool).or_default();
    if !pending.inputs.iter().any(|i| i == path) {
      pending.inputs.push(path.to_string());
    }
    if !pending.input_types.contains(&input_type) {
      pending.input_types.push(input_type);
    }
  }

  fn single_step(&mut self, tool: ObjectRef, path: &str, depth: usize) {
    let project = self.project;
    let holder = self.holder_for(tool, path);
    let view = ToolView::new(project, holder);
    let input_type = view.input_type_for_extension(extension(path));

    let mut inputs = vec![path.to_string()];
    let mut dependencies = Vec::new();
    if let Some(input_type) = &input_type {
      inputs.extend(input_type.additional_inputs().into_iter().filter(|i| is_file_reference(i)));
      dependencies.extend(
        input_type
          .additional_dependencies()
          .into_iter()
          .filter(|d| is_file_reference(d)),
      );
    }

    let output_type = view.output_type_for(input_type.as_ref());
    let dir = self.output_dir(path);
    let produced: Vec<String> = output_type
      .map(|output| {
        naming::output_names(project, holder, &output, path, self.providers)
          .into_iter()
          .map(|name| join(&dir, &name))
          .collect()
      })
      .unwrap_or_default();

    let mut outputs = produced.clone();
    if self.flags.depfiles
      && let Some(dep_ext) = view.dependency_extension()
    {
      outputs.push(join(&dir, &format!("{}.{dep_ext}", naming::stem(path))));
    }

    self.push_step(holder, StepKind::Single, inputs, dependencies, outputs);

    let variable = output_type.and_then(|o| o.build_variable());
    for output in produced {
      self.route(&output, variable, Some(tool), depth + 1);
    }
  }

  fn multi_step(&mut self, tool: ObjectRef, is_target: bool, artifact: &str, artifact_ext: &str) {
    let project = self.project;
    let view = ToolView::new(project, tool);
    let Some(pending) = self.pending.remove(&tool) else {
      debug!(tool = view.id(), "no inputs; step pruned");
      return;
    };

    let mut inputs = pending.inputs;
    let mut dependencies = Vec::new();
    for input_type in view.input_types().into_iter().filter(|i| pending.input_types.contains(&i.r)) {
      inputs.extend(input_type.additional_inputs().into_iter().filter(|i| is_file_reference(i)));
      dependencies.extend(
        input_type
          .additional_dependencies()
          .into_iter()
          .filter(|d| is_file_reference(d)),
      );
    }

    let output_type = view.primary_output_type();
    let outputs: Vec<String> = if is_target {
      let prefix = output_type.map(|o| o.output_prefix()).unwrap_or_default();
      let ext = match artifact_ext {
        "" => output_type
          .and_then(|o| o.extensions().into_iter().next())
          .unwrap_or_default(),
        ext => ext.to_string(),
      };
      vec![join(&self.build_dir, &artifact_name(artifact, &ext, prefix))]
    } else {
      output_type
        .map(|output| {
          naming::output_names(project, tool, &output, artifact, self.providers)
            .into_iter()
            .map(|name| join(&self.build_dir, &name))
            .collect()
        })
        .unwrap_or_default()
    };

    self.push_step(tool, StepKind::Multi, inputs, dependencies, outputs.clone());

    let variable = output_type.and_then(|o| o.build_variable());
    for output in outputs {
      self.route(&output, variable, Some(tool), 0);
    }
  }

  fn push_step(
    &mut self,
    holder: ObjectRef,
    kind: StepKind,
    inputs: Vec<String>,
    dependencies: Vec<String>,
    outputs: Vec<String>,
  ) {
    let project = self.project;
    let tool = project.object(project.extension_root(holder)).id.clone();
    let command = command_line(project, holder, &inputs, &outputs);
    trace!(tool = %tool, ?kind, inputs = inputs.len(), outputs = ?outputs, "planned step");

    self.steps.push(BuildStep {
      id: StepId(self.steps.len()),
      tool,
      tool_name: project.name_of(holder).to_string(),
      kind,
      inputs,
      dependencies,
      outputs,
      command,
      needs_rebuild: true,
    });
  }

  /// The tool copy of the file's resource configuration, if it has one.
  fn holder_for(&self, tool: ObjectRef, path: &str) -> ObjectRef {
    let project = self.project;
    let root = project.extension_root(tool);
    project
      .resource_configuration(self.configuration, path)
      .and_then(|rc| {
        project
          .scope_tools(rc)
          .into_iter()
          .find(|&t| project.extension_root(t) == root)
      })
      .unwrap_or(tool)
  }

  fn is_build_output(&self, path: &str) -> bool {
    !self.build_dir.is_empty()
      && self.build_dir != "."
      && path
        .strip_prefix(self.build_dir.as_str())
        .is_some_and(|rest| rest.starts_with('/'))
  }

  /// Outputs mirror the input's directory under the build directory.
  fn output_dir(&self, path: &str) -> String {
    let relative = if self.is_build_output(path) {
      &path[self.build_dir.len() + 1..]
    } else {
      path
    };
    match relative.rsplit_once('/') {
      Some((dir, _)) => join(&self.build_dir, dir),
      None => self.build_dir.clone(),
    }
  }
}

/// Tools of the configuration that apply to this project.
fn applicable_tools(project: &ProjectModel, configuration: ObjectRef) -> Vec<ObjectRef> {
  project
    .tools(configuration)
    .into_iter()
    .filter(|&t| {
      let view = ToolView::new(project, t);
      if view.is_abstract() || project.object(project.extension_root(t)).is_abstract {
        debug!(tool = view.id(), "abstract tool skipped");
        return false;
      }
      let allowed = nature_allows(view.nature_filter(), project.natures());
      if !allowed {
        debug!(tool = view.id(), filter = ?view.nature_filter(), "tool filtered by project nature");
      }
      allowed
    })
    .collect()
}

/// C-only tools need a project that is C and not C++. A project without
/// natures accepts every tool.
fn nature_allows(filter: NatureFilter, natures: &BTreeSet<Nature>) -> bool {
  if natures.is_empty() {
    return true;
  }
  match filter {
    NatureFilter::Both => true,
    NatureFilter::C => natures.contains(&Nature::C) && !natures.contains(&Nature::Cc),
    NatureFilter::Cc => natures.contains(&Nature::Cc),
  }
}

/// Order tools so that producers come before consumers.
fn order_tools(project: &ProjectModel, tools: &[ObjectRef]) -> Result<Vec<ObjectRef>, DescribeError> {
  let mut graph = DiGraph::<ObjectRef, ()>::new();
  let nodes: Vec<_> = tools.iter().map(|&t| graph.add_node(t)).collect();

  for (i, &producer) in tools.iter().enumerate() {
    for output in ToolView::new(project, producer).output_types() {
      let extensions = output.extensions();
      let variable = output.build_variable();

      for (j, &consumer) in tools.iter().enumerate() {
        if i == j {
          continue;
        }
        let feeds = ToolView::new(project, consumer).input_types().iter().any(|input| {
          extensions.iter().any(|e| input.accepts(e)) || (variable.is_some() && input.build_variable() == variable)
        });
        if feeds && graph.find_edge(nodes[i], nodes[j]).is_none() {
          graph.add_edge(nodes[i], nodes[j], ());
        }
      }
    }
  }

  match toposort(&graph, None) {
    Ok(order) => Ok(order.into_iter().map(|n| graph[n]).collect()),
    Err(cycle) => {
      let members = tarjan_scc(&graph)
        .into_iter()
        .find(|scc| scc.contains(&cycle.node_id()))
        .unwrap_or_else(|| vec![cycle.node_id()]);
      let mut ids: Vec<String> = members
        .into_iter()
        .map(|n| project.object(project.extension_root(graph[n])).id.clone())
        .collect();
      ids.sort();
      Err(DescribeError::BuildGraphCycle(ids))
    }
  }
}

fn extension(path: &str) -> &str {
  Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or_default()
}

/// Build macros such as `$(LIBS)` are not files.
fn is_file_reference(value: &str) -> bool {
  !value.trim().is_empty() && !value.contains("$(")
}

fn join(dir: &str, name: &str) -> String {
  if dir.is_empty() || dir == "." {
    name.to_string()
  } else {
    format!("{dir}/{name}")
  }
}
