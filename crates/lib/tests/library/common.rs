//! Shared fixtures for library scenario tests.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use mbs_lib::describe::{BuildDescription, BuildFlags, DescriptionBuilder};
use mbs_lib::execute::{CancelToken, ExecuteConfig, ExecuteSummary, Executor};
use mbs_lib::manifest::ManifestElement;
use mbs_lib::model::{ConfigurationView, ModelRegistry, ObjectRef};
use mbs_lib::project::{Nature, ProjectModel};
use mbs_lib::resource::{FsResourceProvider, ResourceDelta};
use mbs_lib::state::BuildStateStore;
use tempfile::TempDir;

fn el(kind: &str, id: &str) -> ManifestElement {
  ManifestElement::new(kind).attr_set("id", id)
}

/// A tool chain whose "compiler" and "linker" are `cat`.
pub fn cat_registry() -> Arc<ModelRegistry> {
  let compiler = el("tool", "demo.cc")
    .attr_set("name", "Demo Compiler")
    .attr_set("command", "cat")
    .attr_set("commandLinePattern", "${COMMAND} ${FLAGS} ${INPUTS} > ${OUTPUT}")
    .child(
      el("option", "demo.cc.option.extra")
        .attr_set("name", "Extra")
        .attr_set("valueType", "string"),
    )
    .child(el("inputType", "demo.cc.input").attr_set("sources", "c"))
    .child(
      el("outputType", "demo.cc.output")
        .attr_set("outputs", "o")
        .attr_set("buildVariable", "OBJS"),
    );

  let linker = el("tool", "demo.ld")
    .attr_set("name", "Demo Linker")
    .attr_set("command", "cat")
    .attr_set("commandLinePattern", "${COMMAND} ${INPUTS} > ${OUTPUT}")
    .child(
      el("inputType", "demo.ld.input")
        .attr_set("sources", "o")
        .attr_set("buildVariable", "OBJS")
        .attr_set("multipleOfType", "true"),
    )
    .child(el("outputType", "demo.ld.output").attr_set("primaryOutput", "true"));

  let project_type = el("projectType", "demo.exe").child(
    el("configuration", "demo.exe.debug").attr_set("name", "Debug").child(
      el("toolChain", "demo.toolchain")
        .attr_set("targetTool", "demo.ld")
        .child(compiler)
        .child(linker),
    ),
  );

  let registry = ModelRegistry::load(&[project_type]);
  assert!(registry.diagnostics().is_empty(), "{:?}", registry.diagnostics());
  Arc::new(registry)
}

pub fn cat_project() -> ProjectModel {
  ProjectModel::create(cat_registry(), "demo.exe", "app", BTreeSet::from([Nature::C])).unwrap()
}

/// A project directory with the given source files.
pub fn workspace(files: &[(&str, &str)]) -> TempDir {
  let dir = TempDir::new().unwrap();
  for (path, content) in files {
    write(dir.path(), path, content);
  }
  dir
}

pub fn write(root: &Path, path: &str, content: &str) {
  let full = root.join(path);
  std::fs::create_dir_all(full.parent().unwrap()).unwrap();
  std::fs::write(full, content).unwrap();
}

pub fn read(root: &Path, path: &str) -> String {
  std::fs::read_to_string(root.join(path)).unwrap()
}

/// Plan and run one build the way `mbs build` does.
pub async fn build(
  project: &mut ProjectModel,
  configuration: ObjectRef,
  root: &Path,
  config: ExecuteConfig,
) -> (BuildDescription, ExecuteSummary) {
  let store = BuildStateStore::for_project(root);
  let id = ConfigurationView::new(&*project, configuration).id().to_string();
  let mut state = store.load(&id).unwrap();
  let provider = FsResourceProvider::new(root).skip_dir("Debug");
  let delta = ResourceDelta::compute(&state.known_signatures(), &provider).unwrap();

  let desc = DescriptionBuilder::new(project)
    .build(configuration, &state, &delta, &provider, BuildFlags::default())
    .unwrap();

  let summary = Executor::with_shell(config)
    .with_state_store(store)
    .execute(&desc, &mut state, &provider, CancelToken::never())
    .await
    .unwrap();

  if summary.failed() == 0 {
    project.clear_rebuild(configuration);
  }
  (desc, summary)
}
