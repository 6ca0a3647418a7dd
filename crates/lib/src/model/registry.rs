//! Extension object registry and inheritance resolution.
//!
//! Loading happens in two phases. The construction phase turns every manifest
//! element into a [`ModelObject`] and indexes it by kind and ID. The
//! resolution phase then replaces `superClass` ID strings with handles, kind
//! by kind in [`ObjectKind::RESOLUTION_ORDER`]. Forward references are legal
//! because nothing is resolved until everything is constructed.
//!
//! After resolution each object's effective attributes and effective child
//! list are computed once and memoized, so queries never re-walk the chain.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use crate::manifest::ManifestElement;

use super::{AttrValue, ModelDiagnostic, ModelObject, ModelView, ObjectKind, ObjectRef, merge_children, split_list};

/// Attributes with structural meaning that are not stored in the attribute map.
const STRUCTURAL_ATTRIBUTES: [&str; 5] = ["id", "superClass", "unusedChildren", "isAbstract", "version"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolveState {
  Unvisited,
  InProgress,
  Done,
}

/// Table of manifest-defined build objects.
#[derive(Debug, Default)]
pub struct ModelRegistry {
  objects: Vec<ModelObject>,
  index: HashMap<ObjectKind, HashMap<String, ObjectRef>>,
  diagnostics: Vec<ModelDiagnostic>,

  /// Effective attributes per object, filled by [`ModelRegistry::resolve`].
  flattened: Vec<BTreeMap<String, AttrValue>>,

  /// Effective child lists per object, filled by [`ModelRegistry::resolve`].
  merged: Vec<Vec<ObjectRef>>,
}

impl ModelRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Construct and resolve a registry from manifest element records.
  ///
  /// Defects in individual elements never fail the load; they are recorded
  /// in [`ModelRegistry::diagnostics`].
  pub fn load(elements: &[ManifestElement]) -> Self {
    let mut registry = Self::new();
    for element in elements {
      registry.construct(element, None);
    }
    registry.resolve();

    info!(
      objects = registry.objects.len(),
      diagnostics = registry.diagnostics.len(),
      "loaded extension registry"
    );
    registry
  }

  /// Insert an object into its kind's ID table.
  ///
  /// If the ID is already taken the first registration is kept and a
  /// [`ModelDiagnostic::DuplicateId`] is returned.
  pub fn register(&mut self, mut object: ModelObject) -> Result<ObjectRef, ModelDiagnostic> {
    let ids = self.index.entry(object.kind).or_default();
    if ids.contains_key(&object.id) {
      return Err(ModelDiagnostic::DuplicateId {
        kind: object.kind,
        id: object.id,
      });
    }

    let r = ObjectRef::Extension(self.objects.len());
    ids.insert(object.id.clone(), r);
    object.extension = true;
    self.objects.push(object);

    // New objects invalidate the memoized views until the next resolve.
    self.flattened.clear();
    self.merged.clear();
    Ok(r)
  }

  pub fn lookup(&self, kind: ObjectKind, id: &str) -> Option<ObjectRef> {
    self.index.get(&kind).and_then(|ids| ids.get(id)).copied()
  }

  pub fn get(&self, index: usize) -> &ModelObject {
    &self.objects[index]
  }

  pub fn len(&self) -> usize {
    self.objects.len()
  }

  pub fn is_empty(&self) -> bool {
    self.objects.is_empty()
  }

  pub fn diagnostics(&self) -> &[ModelDiagnostic] {
    &self.diagnostics
  }

  /// All objects of a kind, in registration order.
  pub fn objects_of_kind(&self, kind: ObjectKind) -> Vec<ObjectRef> {
    self
      .objects
      .iter()
      .enumerate()
      .filter(|(_, object)| object.kind == kind)
      .map(|(i, _)| ObjectRef::Extension(i))
      .collect()
  }

  pub(crate) fn flattened_attr(&self, index: usize, name: &str) -> Option<&AttrValue> {
    if let Some(attrs) = self.flattened.get(index) {
      return attrs.get(name);
    }

    // Not resolved yet: walk the raw chain.
    let mut current = Some(index);
    let mut steps = 0;
    while let Some(i) = current
      && steps <= self.objects.len()
    {
      let object = &self.objects[i];
      if let Some(value) = object.attributes.get(name) {
        return Some(value);
      }
      current = match object.superclass {
        Some(ObjectRef::Extension(j)) => Some(j),
        _ => None,
      };
      steps += 1;
    }
    None
  }

  pub(crate) fn merged_children(&self, index: usize) -> &[ObjectRef] {
    match self.merged.get(index) {
      Some(children) => children,
      None => &self.objects[index].children,
    }
  }

  /// Record a non-fatal defect.
  fn report(&mut self, diagnostic: ModelDiagnostic) {
    warn!(diagnostic = %diagnostic, "model defect");
    self.diagnostics.push(diagnostic);
  }

  /// Construction phase for one element and its subtree.
  fn construct(&mut self, element: &ManifestElement, parent: Option<ObjectRef>) -> Option<ObjectRef> {
    let Some(kind) = ObjectKind::from_element_name(&element.kind) else {
      debug!(element = %element.kind, "ignoring unknown manifest element");
      return None;
    };

    let Some(id) = element.id() else {
      self.report(ModelDiagnostic::MissingId { kind });
      return None;
    };

    let mut object = ModelObject::new(kind, id);
    object.parent = parent;
    object.superclass_id = element.attr("superClass").filter(|s| !s.is_empty()).map(str::to_string);
    object.unused_children = element
      .attr("unusedChildren")
      .map(|s| split_list(s, ';'))
      .unwrap_or_default();
    object.is_abstract = element.attr("isAbstract") == Some("true");
    if let Some(version) = element.attr("version").and_then(|v| semver::Version::parse(v).ok()) {
      object.version = Some(version);
    }

    for (name, value) in &element.attributes {
      if !STRUCTURAL_ATTRIBUTES.contains(&name.as_str()) {
        object.attributes.insert(name.clone(), AttrValue::Text(value.clone()));
      }
    }

    match kind {
      ObjectKind::Option => collect_option_values(element, &mut object.attributes),
      ObjectKind::InputType => collect_additional_inputs(element, &mut object.attributes),
      _ => {}
    }

    let r = match self.register(object) {
      Ok(r) => r,
      Err(diagnostic) => {
        self.report(diagnostic);
        return None;
      }
    };

    for child in &element.children {
      if let Some(child_ref) = self.construct(child, Some(r))
        && let ObjectRef::Extension(i) = r
      {
        self.objects[i].children.push(child_ref);
      }
    }

    Some(r)
  }

  /// Resolution phase: link superclasses, check references, then memoize
  /// effective attributes and children.
  pub fn resolve(&mut self) {
    let mut states = vec![ResolveState::Unvisited; self.objects.len()];

    for kind in ObjectKind::RESOLUTION_ORDER {
      for i in 0..self.objects.len() {
        if self.objects[i].kind == kind {
          let mut stack = Vec::new();
          self.resolve_object(i, &mut states, &mut stack);
        }
      }
    }

    self.check_category_references();

    let mut flattened = vec![None; self.objects.len()];
    for i in 0..self.objects.len() {
      self.flatten(i, &mut flattened);
    }
    self.flattened = flattened.into_iter().map(Option::unwrap_or_default).collect();

    let mut merged = vec![None; self.objects.len()];
    for i in 0..self.objects.len() {
      self.merge(i, &mut merged);
    }
    self.merged = merged.into_iter().map(Option::unwrap_or_default).collect();
  }

  fn resolve_object(&mut self, i: usize, states: &mut [ResolveState], stack: &mut Vec<usize>) {
    if states[i] != ResolveState::Unvisited {
      return;
    }
    states[i] = ResolveState::InProgress;
    stack.push(i);

    let kind = self.objects[i].kind;
    if let Some(superclass_id) = self.objects[i].superclass_id.clone() {
      match self.lookup(kind, &superclass_id) {
        Some(ObjectRef::Extension(j)) if states[j] == ResolveState::InProgress => {
          let start = stack.iter().position(|&k| k == j).unwrap_or(0);
          let mut chain: Vec<String> = stack[start..].iter().map(|&k| self.objects[k].id.clone()).collect();
          chain.push(self.objects[j].id.clone());
          self.report(ModelDiagnostic::CyclicInheritance { kind, chain });
        }
        Some(r @ ObjectRef::Extension(j)) => {
          self.resolve_object(j, states, stack);
          self.objects[i].superclass = Some(r);
        }
        Some(ObjectRef::Local(_)) | None => {
          let id = self.objects[i].id.clone();
          self.report(ModelDiagnostic::UnresolvedReference {
            kind,
            id,
            attribute: "superClass".to_string(),
            target: superclass_id,
          });
        }
      }
    }

    stack.pop();
    states[i] = ResolveState::Done;
  }

  fn check_category_references(&mut self) {
    let mut missing = Vec::new();
    for object in self.objects.iter().filter(|o| o.kind == ObjectKind::Option) {
      if let Some(category) = object.attributes.get("category").and_then(AttrValue::as_str)
        && self.lookup(ObjectKind::OptionCategory, category).is_none()
      {
        missing.push(ModelDiagnostic::UnresolvedReference {
          kind: ObjectKind::Option,
          id: object.id.clone(),
          attribute: "category".to_string(),
          target: category.to_string(),
        });
      }
    }
    for diagnostic in missing {
      self.report(diagnostic);
    }
  }

  fn flatten(&self, i: usize, memo: &mut Vec<Option<BTreeMap<String, AttrValue>>>) -> BTreeMap<String, AttrValue> {
    if let Some(done) = &memo[i] {
      return done.clone();
    }

    let object = &self.objects[i];
    let mut attrs = match object.superclass {
      Some(ObjectRef::Extension(j)) => self.flatten(j, memo),
      _ => BTreeMap::new(),
    };
    for (name, value) in &object.attributes {
      attrs.insert(name.clone(), value.clone());
    }

    memo[i] = Some(attrs.clone());
    attrs
  }

  fn merge(&self, i: usize, memo: &mut Vec<Option<Vec<ObjectRef>>>) -> Vec<ObjectRef> {
    if let Some(done) = &memo[i] {
      return done.clone();
    }

    let object = &self.objects[i];
    let inherited = match object.superclass {
      Some(ObjectRef::Extension(j)) => self.merge(j, memo),
      _ => Vec::new(),
    };
    let merged = merge_children(self, inherited, &object.unused_children, &object.children);

    memo[i] = Some(merged.clone());
    merged
  }
}

impl ModelView for ModelRegistry {
  fn registry(&self) -> &ModelRegistry {
    self
  }

  fn local_objects(&self) -> &[ModelObject] {
    &[]
  }
}

/// Fold `enumeratedOptionValue` and `listOptionValue` children into attributes.
fn collect_option_values(element: &ManifestElement, attrs: &mut BTreeMap<String, AttrValue>) {
  let mut enum_ids = Vec::new();
  let mut enum_default = None;
  let mut list_values = Vec::new();

  for child in &element.children {
    match child.kind.as_str() {
      "enumeratedOptionValue" => {
        let Some(id) = child.id() else { continue };
        enum_ids.push(id.to_string());
        if let Some(command) = child.attr("command") {
          attrs.insert(format!("enum:{id}"), AttrValue::text(command));
        }
        if let Some(name) = child.attr("name") {
          attrs.insert(format!("enumName:{id}"), AttrValue::text(name));
        }
        if child.attr("isDefault") == Some("true") && enum_default.is_none() {
          enum_default = Some(id.to_string());
        }
      }
      "listOptionValue" => {
        if let Some(value) = child.attr("value") {
          list_values.push(value.to_string());
        }
      }
      _ => {}
    }
  }

  if !enum_ids.is_empty() {
    attrs.insert("enumValues".to_string(), AttrValue::List(enum_ids));
  }
  if let Some(default) = enum_default {
    attrs.entry("defaultValue".to_string()).or_insert(AttrValue::Text(default));
  }
  if !list_values.is_empty() {
    attrs.entry("defaultValue".to_string()).or_insert(AttrValue::List(list_values));
  }
}

/// Fold `additionalInput` children into `additionalInput` (command-line
/// inputs) and `additionalDependency` (dependency-only) lists.
fn collect_additional_inputs(element: &ManifestElement, attrs: &mut BTreeMap<String, AttrValue>) {
  let mut inputs = Vec::new();
  let mut dependencies = Vec::new();

  for child in element.children.iter().filter(|c| c.kind == "additionalInput") {
    let paths = child.attr("paths").map(|p| split_list(p, ';')).unwrap_or_default();
    match child.attr("kind").unwrap_or("additionalinputdependency") {
      "additionalinput" => inputs.extend(paths),
      "additionaldependency" => dependencies.extend(paths),
      _ => {
        inputs.extend(paths.iter().cloned());
        dependencies.extend(paths);
      }
    }
  }

  if !inputs.is_empty() {
    attrs.insert("additionalInput".to_string(), AttrValue::List(inputs));
  }
  if !dependencies.is_empty() {
    attrs.insert("additionalDependency".to_string(), AttrValue::List(dependencies));
  }
}

/// A registry that is loaded at most once, on first use.
///
/// Concurrent first callers block until the single load completes and then
/// all observe the same registry.
#[derive(Debug, Default)]
pub struct SharedRegistry {
  cell: OnceLock<Arc<ModelRegistry>>,
}

impl SharedRegistry {
  pub const fn new() -> Self {
    Self { cell: OnceLock::new() }
  }

  /// Return the registry, loading it from `source` if this is the first call.
  pub fn get_or_load<F>(&self, source: F) -> Arc<ModelRegistry>
  where
    F: FnOnce() -> Vec<ManifestElement>,
  {
    self
      .cell
      .get_or_init(|| {
        debug!("loading extension registry");
        Arc::new(ModelRegistry::load(&source()))
      })
      .clone()
  }

  pub fn get(&self) -> Option<Arc<ModelRegistry>> {
    self.cell.get().cloned()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use tracing_test::traced_test;

  use super::*;

  fn el(kind: &str, id: &str) -> ManifestElement {
    ManifestElement::new(kind).attr_set("id", id)
  }

  fn chain_manifest() -> Vec<ManifestElement> {
    vec![
      // Declared most-derived first: superclass references point forward.
      el("tool", "c").attr_set("superClass", "b").attr_set("unusedChildren", "opt.b"),
      el("tool", "b")
        .attr_set("superClass", "a")
        .child(el("option", "opt.b").attr_set("valueType", "boolean")),
      el("tool", "a")
        .attr_set("command", "gcc")
        .attr_set("name", "Compiler A")
        .child(el("option", "opt.a").attr_set("valueType", "string")),
    ]
  }

  fn ids(registry: &ModelRegistry, refs: &[ObjectRef]) -> Vec<String> {
    refs.iter().map(|r| registry.object(*r).id.clone()).collect()
  }

  #[test]
  fn attribute_inherited_through_chain() {
    let registry = ModelRegistry::load(&chain_manifest());
    assert!(registry.diagnostics().is_empty());

    let c = registry.lookup(ObjectKind::Tool, "c").unwrap();
    assert_eq!(registry.effective_str(c, "command"), Some("gcc"));
    assert_eq!(registry.name_of(c), "Compiler A");
  }

  #[test]
  fn unused_children_excluded() {
    let registry = ModelRegistry::load(&chain_manifest());

    let b = registry.lookup(ObjectKind::Tool, "b").unwrap();
    let c = registry.lookup(ObjectKind::Tool, "c").unwrap();
    assert_eq!(ids(&registry, &registry.effective_children(b, None)), vec!["opt.a", "opt.b"]);
    assert_eq!(ids(&registry, &registry.effective_children(c, None)), vec!["opt.a"]);
  }

  #[test]
  fn local_child_replaces_inherited_child() {
    let manifest = vec![
      el("toolChain", "base").child(el("tool", "base.cc").attr_set("command", "cc")),
      el("toolChain", "derived")
        .attr_set("superClass", "base")
        .child(el("tool", "derived.cc").attr_set("superClass", "base.cc"))
        .child(el("tool", "derived.ld")),
    ];
    let registry = ModelRegistry::load(&manifest);

    let derived = registry.lookup(ObjectKind::ToolChain, "derived").unwrap();
    let tools = registry.effective_children(derived, Some(ObjectKind::Tool));
    assert_eq!(ids(&registry, &tools), vec!["derived.cc", "derived.ld"]);
    assert_eq!(registry.effective_str(tools[0], "command"), Some("cc"));
  }

  #[test]
  #[traced_test]
  fn duplicate_id_keeps_first() {
    let manifest = vec![
      el("tool", "cc").attr_set("command", "first"),
      el("tool", "cc").attr_set("command", "second"),
      // Same ID in another kind is not a duplicate.
      el("option", "cc"),
    ];
    let registry = ModelRegistry::load(&manifest);

    let duplicates: Vec<_> = registry
      .diagnostics()
      .iter()
      .filter(|d| matches!(d, ModelDiagnostic::DuplicateId { .. }))
      .collect();
    assert_eq!(duplicates.len(), 1);

    let cc = registry.lookup(ObjectKind::Tool, "cc").unwrap();
    assert_eq!(registry.effective_str(cc, "command"), Some("first"));
    assert!(registry.lookup(ObjectKind::Option, "cc").is_some());
    assert!(logs_contain("duplicate tool id 'cc'"));
  }

  #[test]
  fn unresolved_superclass_is_not_fatal() {
    let manifest = vec![
      el("tool", "orphan").attr_set("superClass", "missing"),
      el("tool", "fine").attr_set("command", "ok"),
    ];
    let registry = ModelRegistry::load(&manifest);

    assert_eq!(
      registry.diagnostics(),
      &[ModelDiagnostic::UnresolvedReference {
        kind: ObjectKind::Tool,
        id: "orphan".into(),
        attribute: "superClass".into(),
        target: "missing".into(),
      }]
    );
    let orphan = registry.lookup(ObjectKind::Tool, "orphan").unwrap();
    assert_eq!(registry.object(orphan).superclass, None);
    let fine = registry.lookup(ObjectKind::Tool, "fine").unwrap();
    assert_eq!(registry.effective_str(fine, "command"), Some("ok"));
  }

  #[test]
  fn cyclic_inheritance_detected() {
    let manifest = vec![
      el("tool", "a").attr_set("superClass", "b"),
      el("tool", "b").attr_set("superClass", "a").attr_set("command", "b-cmd"),
      el("tool", "self").attr_set("superClass", "self"),
    ];
    let registry = ModelRegistry::load(&manifest);

    let cycles: Vec<_> = registry
      .diagnostics()
      .iter()
      .filter_map(|d| match d {
        ModelDiagnostic::CyclicInheritance { chain, .. } => Some(chain.clone()),
        _ => None,
      })
      .collect();
    assert_eq!(cycles, vec![vec!["a", "b", "a"], vec!["self", "self"]]);

    // Queries terminate and still see what remains of the chain.
    let a = registry.lookup(ObjectKind::Tool, "a").unwrap();
    assert_eq!(registry.effective_str(a, "command"), Some("b-cmd"));
  }

  #[test]
  fn superclass_must_be_same_kind() {
    let manifest = vec![el("option", "x"), el("tool", "t").attr_set("superClass", "x")];
    let registry = ModelRegistry::load(&manifest);
    assert!(matches!(
      registry.diagnostics(),
      [ModelDiagnostic::UnresolvedReference { kind: ObjectKind::Tool, .. }]
    ));
  }

  #[test]
  fn missing_id_and_unknown_category_reported() {
    let manifest = vec![
      ManifestElement::new("tool"),
      el("option", "o").attr_set("category", "nowhere"),
      el("optionCategory", "here"),
      el("option", "p").attr_set("category", "here"),
    ];
    let registry = ModelRegistry::load(&manifest);
    assert_eq!(registry.diagnostics().len(), 2);
    assert!(registry.diagnostics().contains(&ModelDiagnostic::MissingId { kind: ObjectKind::Tool }));
  }

  #[test]
  fn option_value_children_become_attributes() {
    let manifest = vec![
      el("option", "opt.level")
        .attr_set("valueType", "enumerated")
        .child(el("enumeratedOptionValue", "opt.level.none").attr_set("command", "-O0"))
        .child(
          el("enumeratedOptionValue", "opt.level.max")
            .attr_set("command", "-O3")
            .attr_set("isDefault", "true"),
        ),
      el("option", "opt.paths")
        .attr_set("valueType", "includePath")
        .child(ManifestElement::new("listOptionValue").attr_set("value", "/usr/include"))
        .child(ManifestElement::new("listOptionValue").attr_set("value", "inc")),
      el("inputType", "in")
        .child(
          ManifestElement::new("additionalInput")
            .attr_set("paths", "$(LIBS)")
            .attr_set("kind", "additionalinput"),
        )
        .child(ManifestElement::new("additionalInput").attr_set("paths", "deps.txt;more.txt")),
    ];
    let registry = ModelRegistry::load(&manifest);

    let level = registry.lookup(ObjectKind::Option, "opt.level").unwrap();
    assert_eq!(registry.effective_list(level, "enumValues"), vec!["opt.level.none", "opt.level.max"]);
    assert_eq!(registry.effective_str(level, "defaultValue"), Some("opt.level.max"));
    assert_eq!(registry.effective_str(level, "enum:opt.level.none"), Some("-O0"));

    let paths = registry.lookup(ObjectKind::Option, "opt.paths").unwrap();
    assert_eq!(registry.effective_list(paths, "defaultValue"), vec!["/usr/include", "inc"]);

    let input = registry.lookup(ObjectKind::InputType, "in").unwrap();
    assert_eq!(
      registry.effective_list(input, "additionalInput"),
      vec!["$(LIBS)", "deps.txt", "more.txt"]
    );
    assert_eq!(registry.effective_list(input, "additionalDependency"), vec!["deps.txt", "more.txt"]);
  }

  #[test]
  fn nested_children_registered_globally() {
    let registry = ModelRegistry::load(&chain_manifest());
    let opt = registry.lookup(ObjectKind::Option, "opt.a").unwrap();
    let a = registry.lookup(ObjectKind::Tool, "a").unwrap();
    assert_eq!(registry.object(opt).parent, Some(a));
    assert!(registry.object(opt).extension);
  }

  #[test]
  fn sort_key_orders_by_kind_then_name() {
    let manifest = vec![
      el("tool", "t2").attr_set("name", "beta"),
      el("tool", "t1").attr_set("name", "Alpha"),
      el("toolChain", "tc").attr_set("name", "zeta"),
    ];
    let registry = ModelRegistry::load(&manifest);

    let mut refs: Vec<_> = (0..registry.len()).map(ObjectRef::Extension).collect();
    refs.sort_by(|a, b| registry.compare(*a, *b));
    assert_eq!(ids(&registry, &refs), vec!["tc", "t1", "t2"]);
  }

  #[test]
  fn shared_registry_loads_once() {
    let shared = Arc::new(SharedRegistry::new());
    let loads = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let shared = shared.clone();
        let loads = loads.clone();
        std::thread::spawn(move || {
          shared.get_or_load(|| {
            loads.fetch_add(1, Ordering::SeqCst);
            chain_manifest()
          })
        })
      })
      .collect();

    let registries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(registries.iter().all(|r| Arc::ptr_eq(r, &registries[0])));
    assert_eq!(registries[0].len(), 5);
  }
}
