//! Project-local build model.
//!
//! A project is created from a project type: every non-abstract configuration
//! of the type is deep-copied into the project together with its tool-chain,
//! tools, builder and target platform. Copies are local objects whose
//! superclass is the extension object they were copied from, so they inherit
//! everything and only hold what the project changes. Extension objects are
//! never mutated; they sit behind an `Arc` and are shared by all projects.

mod file;
mod options;

pub use file::{DefaultUpgrader, ProjectFile, ProjectUpgrader, StoredObject, StoredRef};
pub use options::{OptionChangeListener, OptionError, OptionValue};

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{
  AttrValue, ConfigurationView, ModelObject, ModelRegistry, ModelView, ObjectKind, ObjectRef, ToolView,
  normalize_extension,
};

/// Object kinds copied when a configuration is instantiated.
///
/// Options, input types and output types stay shared with the extension
/// definitions until a value is overridden.
const COPIED_KINDS: [ObjectKind; 5] = [
  ObjectKind::ToolChain,
  ObjectKind::Tool,
  ObjectKind::TargetPlatform,
  ObjectKind::Builder,
  ObjectKind::ResourceConfiguration,
];

/// Language natures a project can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nature {
  C,
  Cc,
}

impl Nature {
  pub fn parse(value: &str) -> Option<Self> {
    match value {
      "c" => Some(Nature::C),
      "cc" | "c++" | "cpp" => Some(Nature::Cc),
      _ => None,
    }
  }
}

impl fmt::Display for Nature {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Nature::C => f.write_str("c"),
      Nature::Cc => f.write_str("cc"),
    }
  }
}

/// Errors loading or creating a project's build model.
///
/// Any of these leaves the project without usable build information; the
/// caller decides how to surface that.
#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("unknown project type: {0}")]
  UnknownProjectType(String),

  #[error("project type {0} is abstract and cannot be instantiated")]
  AbstractProjectType(String),

  #[error("project file version {found} is not compatible with supported version {supported}")]
  VersionIncompatible { found: String, supported: String },

  #[error("invalid project file version: {0}")]
  InvalidVersion(String),

  #[error("{kind} '{id}' references missing object '{target}'")]
  MissingReference {
    kind: ObjectKind,
    id: String,
    target: String,
  },

  #[error("duplicate project object id: {0}")]
  DuplicateObject(String),

  #[error("cyclic superclass chain at project object {0}")]
  CyclicReference(String),

  #[error("project upgrade failed: {0}")]
  Upgrade(String),

  #[error("failed to read project file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write project file {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse project file: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize project file: {0}")]
  Serialize(#[source] serde_json::Error),
}

/// A project's resolved build model.
pub struct ProjectModel {
  registry: Arc<ModelRegistry>,
  name: String,
  project_type: ObjectRef,
  natures: BTreeSet<Nature>,

  /// Local object arena; [`ObjectRef::Local`] indexes into it.
  objects: Vec<ModelObject>,

  /// Configuration roots, in creation order.
  configurations: Vec<ObjectRef>,
  default_configuration: Option<String>,

  /// Configurations whose options or tool commands changed since their last build.
  rebuild_needed: BTreeSet<String>,

  /// Counter for derived object IDs.
  next_id: u64,

  listeners: Vec<Arc<dyn OptionChangeListener>>,
}

impl fmt::Debug for ProjectModel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ProjectModel")
      .field("name", &self.name)
      .field("project_type", &self.project_type)
      .field("natures", &self.natures)
      .field("objects", &self.objects.len())
      .field("configurations", &self.configurations)
      .finish_non_exhaustive()
  }
}

impl ModelView for ProjectModel {
  fn registry(&self) -> &ModelRegistry {
    &self.registry
  }

  fn local_objects(&self) -> &[ModelObject] {
    &self.objects
  }
}

impl ProjectModel {
  /// Instantiate a project from an extension project type.
  pub fn create(
    registry: Arc<ModelRegistry>,
    project_type_id: &str,
    name: &str,
    natures: BTreeSet<Nature>,
  ) -> Result<Self, ProjectError> {
    let project_type = registry
      .lookup(ObjectKind::ProjectType, project_type_id)
      .ok_or_else(|| ProjectError::UnknownProjectType(project_type_id.to_string()))?;
    if registry.object(project_type).is_abstract {
      return Err(ProjectError::AbstractProjectType(project_type_id.to_string()));
    }

    let templates: Vec<ObjectRef> = registry
      .effective_children(project_type, Some(ObjectKind::Configuration))
      .into_iter()
      .filter(|c| !registry.object(*c).is_abstract)
      .collect();

    let mut project = Self::empty(registry, name, project_type, natures);
    for template in templates {
      project.instantiate_configuration(template, None);
    }
    project.default_configuration = project.configurations.first().map(|c| project.object(*c).id.clone());

    info!(
      project = %project.name,
      project_type = project_type_id,
      configurations = project.configurations.len(),
      "created project model"
    );
    Ok(project)
  }

  fn empty(registry: Arc<ModelRegistry>, name: &str, project_type: ObjectRef, natures: BTreeSet<Nature>) -> Self {
    Self {
      registry,
      name: name.to_string(),
      project_type,
      natures,
      objects: Vec::new(),
      configurations: Vec::new(),
      default_configuration: None,
      rebuild_needed: BTreeSet::new(),
      next_id: 0,
      listeners: Vec::new(),
    }
  }

  pub fn registry_handle(&self) -> &Arc<ModelRegistry> {
    &self.registry
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn project_type(&self) -> ObjectRef {
    self.project_type
  }

  pub fn natures(&self) -> &BTreeSet<Nature> {
    &self.natures
  }

  pub fn configurations(&self) -> &[ObjectRef] {
    &self.configurations
  }

  pub fn default_configuration(&self) -> Option<ObjectRef> {
    let id = self.default_configuration.as_deref()?;
    self.find_configuration(id)
  }

  pub fn set_default_configuration(&mut self, configuration: ObjectRef) {
    self.default_configuration = Some(self.object(configuration).id.clone());
  }

  /// Find a configuration by local ID, extension ID or display name.
  pub fn find_configuration(&self, key: &str) -> Option<ObjectRef> {
    self.configurations.iter().copied().find(|&c| {
      self.object(c).id == key || self.object(self.extension_root(c)).id == key || self.name_of(c) == key
    })
  }

  /// Copy another configuration (local or extension) into a new configuration.
  pub fn add_configuration(&mut self, from: ObjectRef, name: &str) -> ObjectRef {
    let cfg = self.instantiate_configuration(from, Some(name));
    debug!(configuration = %self.object(cfg).id, name, "added configuration");
    cfg
  }

  /// Remove a configuration and everything below it.
  pub fn remove_configuration(&mut self, configuration: ObjectRef) -> bool {
    let Some(pos) = self.configurations.iter().position(|c| *c == configuration) else {
      return false;
    };
    self.configurations.remove(pos);
    let id = self.object(configuration).id.clone();
    self.rebuild_needed.remove(&id);
    if self.default_configuration.as_deref() == Some(id.as_str()) {
      self.default_configuration = self.configurations.first().map(|c| self.object(*c).id.clone());
    }
    true
  }

  /// The configuration a scope (configuration or resource configuration) belongs to.
  pub fn configuration_of(&self, scope: ObjectRef) -> ObjectRef {
    let mut current = scope;
    while self.object(current).kind != ObjectKind::Configuration {
      match self.object(current).parent {
        Some(parent) => current = parent,
        None => break,
      }
    }
    current
  }

  /// Tools of a configuration's tool-chain.
  pub fn tools(&self, configuration: ObjectRef) -> Vec<ObjectRef> {
    ConfigurationView::new(self, configuration)
      .tool_chain()
      .map(|tc| tc.tools().into_iter().map(|t| t.r).collect())
      .unwrap_or_default()
  }

  /// Find a tool of a scope by local ID, extension ID or name.
  pub fn find_tool(&self, scope: ObjectRef, key: &str) -> Option<ObjectRef> {
    self.scope_tools(scope).into_iter().find(|&t| {
      self.object(t).id == key || self.object(self.extension_root(t)).id == key || self.name_of(t) == key
    })
  }

  /// Tools directly available in a scope.
  pub(crate) fn scope_tools(&self, scope: ObjectRef) -> Vec<ObjectRef> {
    match self.object(scope).kind {
      ObjectKind::ResourceConfiguration => self.effective_children(scope, Some(ObjectKind::Tool)),
      _ => self.tools(scope),
    }
  }

  pub fn resource_configuration(&self, configuration: ObjectRef, path: &str) -> Option<ObjectRef> {
    ConfigurationView::new(self, configuration)
      .resource_configurations()
      .into_iter()
      .find(|rc| self.effective_str(*rc, "resourcePath") == Some(path))
  }

  /// Create (or return) the per-file configuration for `path`.
  ///
  /// The resource configuration gets its own copies of the tools that build
  /// the file's type, so options can be overridden for that file alone.
  pub fn create_resource_configuration(&mut self, configuration: ObjectRef, path: &str) -> ObjectRef {
    if let Some(existing) = self.resource_configuration(configuration, path) {
      return existing;
    }

    let ext = std::path::Path::new(path)
      .extension()
      .and_then(|e| e.to_str())
      .unwrap_or_default()
      .to_string();
    let tools: Vec<ObjectRef> = self
      .tools(configuration)
      .into_iter()
      .filter(|t| ToolView::new(self, *t).builds_file_type(normalize_extension(&ext)))
      .collect();

    let base = self.object(configuration).id.clone();
    let id = self.derived_id(&base);
    let mut rc = ModelObject::new(ObjectKind::ResourceConfiguration, id);
    rc.parent = Some(configuration);
    rc.attributes.insert("resourcePath".to_string(), AttrValue::text(path));
    rc.attributes.insert("excluded".to_string(), AttrValue::Flag(false));
    let rc = self.push_local(rc);
    self.attach_child(configuration, rc);

    for tool in tools {
      self.copy_object(tool, Some(rc));
    }

    debug!(path, resource_configuration = %self.object(rc).id, "created resource configuration");
    rc
  }

  /// Exclude or include a file from a configuration's build.
  pub fn set_excluded(&mut self, configuration: ObjectRef, path: &str, excluded: bool) {
    let rc = self.create_resource_configuration(configuration, path);
    if let ObjectRef::Local(i) = rc {
      self.objects[i]
        .attributes
        .insert("excluded".to_string(), AttrValue::Flag(excluded));
    }
    self.mark_rebuild(configuration);
  }

  pub fn is_excluded(&self, configuration: ObjectRef, path: &str) -> bool {
    self
      .resource_configuration(configuration, path)
      .and_then(|rc| self.effective_bool(rc, "excluded"))
      .unwrap_or(false)
  }

  pub fn needs_rebuild(&self, configuration: ObjectRef) -> bool {
    self.rebuild_needed.contains(&self.object(configuration).id)
  }

  pub fn mark_rebuild(&mut self, configuration: ObjectRef) {
    let id = self.object(self.configuration_of(configuration)).id.clone();
    self.rebuild_needed.insert(id);
  }

  pub fn clear_rebuild(&mut self, configuration: ObjectRef) {
    let id = self.object(configuration).id.clone();
    self.rebuild_needed.remove(&id);
  }

  /// Override a tool's command in a scope.
  ///
  /// Tools in a scope are already project-local copies, so the command is
  /// stored on the copy and the extension tool is left untouched.
  pub fn set_tool_command(&mut self, scope: ObjectRef, tool: ObjectRef, command: &str) -> Result<ObjectRef, OptionError> {
    let holder = self.holder_in_scope(scope, tool, false)?;
    if ToolView::new(self, holder).command() == command {
      return Ok(holder);
    }

    if let ObjectRef::Local(i) = holder {
      self.objects[i]
        .attributes
        .insert("command".to_string(), AttrValue::text(command));
    }
    self.mark_rebuild(scope);
    debug!(tool = %self.object(holder).id, command, "tool command changed");
    Ok(holder)
  }

  pub fn add_listener(&mut self, listener: Arc<dyn OptionChangeListener>) {
    self.listeners.push(listener);
  }

  /// Allocate a project-unique ID derived from `base`.
  fn derived_id(&mut self, base: &str) -> String {
    self.next_id += 1;
    format!("{}.{}", base, self.next_id)
  }

  fn push_local(&mut self, object: ModelObject) -> ObjectRef {
    let r = ObjectRef::Local(self.objects.len());
    self.objects.push(object);
    r
  }

  fn attach_child(&mut self, parent: ObjectRef, child: ObjectRef) {
    if let ObjectRef::Local(i) = parent {
      self.objects[i].children.push(child);
    }
  }

  /// Create a local copy of `source` and of its structural children.
  fn copy_object(&mut self, source: ObjectRef, parent: Option<ObjectRef>) -> ObjectRef {
    let source_object = self.object(source);
    let kind = source_object.kind;
    let base = crate::model::split_id_version(&source_object.id).0.to_string();

    let id = self.derived_id(&base);
    let mut copy = ModelObject::new(kind, id);
    copy.superclass_id = Some(self.object(source).id.clone());
    copy.superclass = Some(source);
    copy.parent = parent;
    let copy = self.push_local(copy);
    if let Some(parent) = parent {
      self.attach_child(parent, copy);
    }

    let children: Vec<ObjectRef> = self
      .effective_children(source, None)
      .into_iter()
      .filter(|c| COPIED_KINDS.contains(&self.object(*c).kind))
      .collect();
    for child in children {
      self.copy_object(child, Some(copy));
    }

    copy
  }

  fn instantiate_configuration(&mut self, template: ObjectRef, name: Option<&str>) -> ObjectRef {
    let cfg = self.copy_object(template, None);
    if let ObjectRef::Local(i) = cfg {
      if let Some(name) = name {
        self.objects[i]
          .attributes
          .insert("name".to_string(), AttrValue::text(name));
      }
      if ConfigurationView::new(self, cfg).artifact_name().is_none() {
        let artifact = AttrValue::text(self.name.clone());
        self.objects[i].attributes.insert("artifactName".to_string(), artifact);
      }
    }
    self.configurations.push(cfg);
    cfg
  }

  /// Resolve `holder` (possibly an extension tool) to the matching holder
  /// local to `scope`.
  ///
  /// For reads, a resource configuration without a matching tool falls back
  /// to its configuration.
  pub(crate) fn holder_in_scope(&self, scope: ObjectRef, holder: ObjectRef, read: bool) -> Result<ObjectRef, OptionError> {
    let scope_object = self.object(scope);
    if !matches!(
      scope_object.kind,
      ObjectKind::Configuration | ObjectKind::ResourceConfiguration
    ) || scope.is_extension()
    {
      return Err(OptionError::InvalidScope(scope_object.id.clone()));
    }

    let root = self.extension_root(holder);
    let mut candidates = self.scope_tools(scope);
    if scope_object.kind == ObjectKind::Configuration
      && let Some(tc) = ConfigurationView::new(self, scope).tool_chain()
    {
      candidates.push(tc.r);
    }

    if let Some(found) = candidates
      .into_iter()
      .find(|&c| c == holder || self.extension_root(c) == root || self.derives_from(c, holder))
    {
      return Ok(found);
    }

    if read && scope_object.kind == ObjectKind::ResourceConfiguration {
      return self.holder_in_scope(self.configuration_of(scope), holder, read);
    }

    Err(OptionError::UnknownHolder {
      scope: scope_object.id.clone(),
      holder: self.object(holder).id.clone(),
    })
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::manifest::ManifestElement;

  fn el(kind: &str, id: &str) -> ManifestElement {
    ManifestElement::new(kind).attr_set("id", id)
  }

  /// A small GNU-like model: one executable project type with Debug/Release.
  pub(crate) fn gnu_registry() -> Arc<ModelRegistry> {
    let compiler = el("tool", "gnu.c.compiler")
      .attr_set("name", "GCC C Compiler")
      .attr_set("command", "gcc")
      .attr_set("outputFlag", "-o")
      .attr_set("natureFilter", "c")
      .attr_set("dependencyExtension", "d")
      .child(
        el("option", "gnu.c.compiler.option.debug")
          .attr_set("name", "Debug")
          .attr_set("valueType", "boolean")
          .attr_set("command", "-g")
          .attr_set("defaultValue", "false"),
      )
      .child(
        el("option", "gnu.c.compiler.option.optimize")
          .attr_set("valueType", "enumerated")
          .child(el("enumeratedOptionValue", "opt.none").attr_set("command", "-O0").attr_set("isDefault", "true"))
          .child(el("enumeratedOptionValue", "opt.max").attr_set("command", "-O3")),
      )
      .child(
        el("option", "gnu.c.compiler.option.include")
          .attr_set("valueType", "includePath")
          .attr_set("command", "-I"),
      )
      .child(
        el("option", "gnu.c.compiler.option.other")
          .attr_set("valueType", "string")
          .attr_set("defaultValue", "-c"),
      )
      .child(el("inputType", "gnu.c.compiler.input").attr_set("sources", "c"))
      .child(
        el("outputType", "gnu.c.compiler.output")
          .attr_set("outputs", "o")
          .attr_set("buildVariable", "OBJS"),
      );

    let linker = el("tool", "gnu.c.linker")
      .attr_set("name", "GCC C Linker")
      .attr_set("command", "gcc")
      .attr_set("outputFlag", "-o")
      .child(el("option", "gnu.c.link.option.libs").attr_set("valueType", "libs").attr_set("command", "-l"))
      .child(
        el("inputType", "gnu.c.linker.input")
          .attr_set("sources", "o")
          .attr_set("buildVariable", "OBJS")
          .attr_set("multipleOfType", "true"),
      )
      .child(el("outputType", "gnu.c.linker.output").attr_set("primaryOutput", "true"));

    let tool_chain = el("toolChain", "gnu.toolchain.base")
      .attr_set("isAbstract", "true")
      .attr_set("targetTool", "gnu.c.linker")
      .child(compiler)
      .child(linker)
      .child(el("builder", "gnu.builder").attr_set("command", "make"))
      .child(el("targetPlatform", "gnu.platform"));

    let exe = el("projectType", "gnu.exe")
      .attr_set("name", "Executable")
      .child(
        el("configuration", "gnu.exe.debug")
          .attr_set("name", "Debug")
          .child(el("toolChain", "gnu.exe.debug.toolchain").attr_set("superClass", "gnu.toolchain.base")),
      )
      .child(
        el("configuration", "gnu.exe.release")
          .attr_set("name", "Release")
          .child(el("toolChain", "gnu.exe.release.toolchain").attr_set("superClass", "gnu.toolchain.base")),
      )
      .child(el("configuration", "gnu.exe.template").attr_set("isAbstract", "true"));

    let registry = ModelRegistry::load(&[
      tool_chain,
      exe,
      el("projectType", "gnu.abstract").attr_set("isAbstract", "true"),
    ]);
    assert!(registry.diagnostics().is_empty(), "{:?}", registry.diagnostics());
    Arc::new(registry)
  }

  pub(crate) fn c_project() -> ProjectModel {
    ProjectModel::create(gnu_registry(), "gnu.exe", "hello", BTreeSet::from([Nature::C])).unwrap()
  }

  #[test]
  fn create_copies_non_abstract_configurations() {
    let project = c_project();
    assert_eq!(project.configurations().len(), 2);

    let debug = project.find_configuration("Debug").unwrap();
    assert!(!debug.is_extension());
    assert_eq!(project.object(project.extension_root(debug)).id, "gnu.exe.debug");
    assert_eq!(project.default_configuration(), Some(debug));
    assert_eq!(ConfigurationView::new(&project, debug).artifact_name(), Some("hello"));

    let tools = project.tools(debug);
    assert_eq!(tools.len(), 2);
    assert!(tools.iter().all(|t| !t.is_extension()));
    assert_eq!(ToolView::new(&project, tools[0]).command(), "gcc");
  }

  #[test]
  fn configurations_do_not_share_copies() {
    let project = c_project();
    let debug = project.find_configuration("Debug").unwrap();
    let release = project.find_configuration("gnu.exe.release").unwrap();

    let debug_tools = project.tools(debug);
    let release_tools = project.tools(release);
    assert!(debug_tools.iter().all(|t| !release_tools.contains(t)));
  }

  #[test]
  fn create_rejects_unknown_and_abstract_types() {
    let registry = gnu_registry();
    assert!(matches!(
      ProjectModel::create(registry.clone(), "nope", "p", BTreeSet::new()),
      Err(ProjectError::UnknownProjectType(_))
    ));
    assert!(matches!(
      ProjectModel::create(registry, "gnu.abstract", "p", BTreeSet::new()),
      Err(ProjectError::AbstractProjectType(_))
    ));
  }

  #[test]
  fn derived_ids_are_unique() {
    let project = c_project();
    let mut ids: Vec<_> = project.local_objects().iter().map(|o| o.id.clone()).collect();
    let count = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), count);
  }

  #[test]
  fn resource_configuration_copies_matching_tools() {
    let mut project = c_project();
    let debug = project.find_configuration("Debug").unwrap();

    let rc = project.create_resource_configuration(debug, "src/main.c");
    assert_eq!(project.resource_configuration(debug, "src/main.c"), Some(rc));
    assert_eq!(project.create_resource_configuration(debug, "src/main.c"), rc);

    let tools = project.scope_tools(rc);
    assert_eq!(tools.len(), 1);
    assert_eq!(project.object(project.extension_root(tools[0])).id, "gnu.c.compiler");
    assert_eq!(project.configuration_of(rc), debug);
  }

  #[test]
  fn exclusion_marks_rebuild() {
    let mut project = c_project();
    let debug = project.find_configuration("Debug").unwrap();
    assert!(!project.needs_rebuild(debug));

    project.set_excluded(debug, "src/skip.c", true);
    assert!(project.is_excluded(debug, "src/skip.c"));
    assert!(!project.is_excluded(debug, "src/main.c"));
    assert!(project.needs_rebuild(debug));

    project.clear_rebuild(debug);
    assert!(!project.needs_rebuild(debug));
  }

  #[test]
  fn tool_command_override_stays_local() {
    let mut project = c_project();
    let debug = project.find_configuration("Debug").unwrap();
    let release = project.find_configuration("Release").unwrap();
    let ext_compiler = project.registry().lookup(ObjectKind::Tool, "gnu.c.compiler").unwrap();

    let holder = project.set_tool_command(debug, ext_compiler, "clang").unwrap();
    assert_eq!(ToolView::new(&project, holder).command(), "clang");
    assert!(project.needs_rebuild(debug));
    assert!(!project.needs_rebuild(release));

    let release_compiler = project.find_tool(release, "gnu.c.compiler").unwrap();
    assert_eq!(ToolView::new(&project, release_compiler).command(), "gcc");
    assert_eq!(project.registry().effective_str(ext_compiler, "command"), Some("gcc"));
  }

  #[test]
  fn add_and_remove_configuration() {
    let mut project = c_project();
    let debug = project.find_configuration("Debug").unwrap();

    let profile = project.add_configuration(debug, "Profile");
    assert_eq!(project.name_of(profile), "Profile");
    assert_eq!(project.tools(profile).len(), 2);
    assert_eq!(project.find_configuration("Profile"), Some(profile));

    assert!(project.remove_configuration(debug));
    assert!(!project.remove_configuration(debug));
    assert_eq!(project.configurations().len(), 2);
    assert_ne!(project.default_configuration(), Some(debug));
  }
}
