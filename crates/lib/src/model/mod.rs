//! Build object model.
//!
//! Every managed-build entity (project types, configurations, tool-chains,
//! tools, input/output types, options, ...) is a [`ModelObject`]: an ID, an
//! optional superclass link to another object of the same kind, a map of
//! locally declared attributes and an ordered list of locally declared
//! children. Effective values are computed by walking the superclass chain;
//! there is no language-level inheritance involved.
//!
//! Objects live in arenas and are addressed with [`ObjectRef`] handles.
//! Manifest-defined ("extension") objects live in the [`ModelRegistry`];
//! project-local copies and overrides live in a project model. Both are read
//! through the [`ModelView`] trait, so an extension object and a project
//! object can be queried the same way.

mod registry;
mod typed;

pub use registry::{ModelRegistry, SharedRegistry};
pub use typed::{
  ConfigurationView, InputTypeView, NatureFilter, OptionView, OutputTypeView, ToolChainView, ToolView, ValueType,
  normalize_extension,
};

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::LIST_SEPARATOR;

/// The kind of a build object.
///
/// Ordering follows the resolution order: each kind's resolution may read
/// already-resolved objects of the kinds before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectKind {
  ProjectType,
  Configuration,
  ResourceConfiguration,
  ToolChain,
  Tool,
  InputType,
  OutputType,
  TargetPlatform,
  Builder,
  Option,
  OptionCategory,
}

impl ObjectKind {
  pub const RESOLUTION_ORDER: [ObjectKind; 11] = [
    ObjectKind::ProjectType,
    ObjectKind::Configuration,
    ObjectKind::ResourceConfiguration,
    ObjectKind::ToolChain,
    ObjectKind::Tool,
    ObjectKind::InputType,
    ObjectKind::OutputType,
    ObjectKind::TargetPlatform,
    ObjectKind::Builder,
    ObjectKind::Option,
    ObjectKind::OptionCategory,
  ];

  /// Map a manifest element name to a kind.
  pub fn from_element_name(name: &str) -> Option<Self> {
    Some(match name {
      "projectType" => ObjectKind::ProjectType,
      "configuration" => ObjectKind::Configuration,
      "resourceConfiguration" => ObjectKind::ResourceConfiguration,
      "toolChain" => ObjectKind::ToolChain,
      "tool" => ObjectKind::Tool,
      "inputType" => ObjectKind::InputType,
      "outputType" => ObjectKind::OutputType,
      "targetPlatform" => ObjectKind::TargetPlatform,
      "builder" => ObjectKind::Builder,
      "option" => ObjectKind::Option,
      "optionCategory" => ObjectKind::OptionCategory,
      _ => return None,
    })
  }

  pub fn element_name(self) -> &'static str {
    match self {
      ObjectKind::ProjectType => "projectType",
      ObjectKind::Configuration => "configuration",
      ObjectKind::ResourceConfiguration => "resourceConfiguration",
      ObjectKind::ToolChain => "toolChain",
      ObjectKind::Tool => "tool",
      ObjectKind::InputType => "inputType",
      ObjectKind::OutputType => "outputType",
      ObjectKind::TargetPlatform => "targetPlatform",
      ObjectKind::Builder => "builder",
      ObjectKind::Option => "option",
      ObjectKind::OptionCategory => "optionCategory",
    }
  }
}

impl fmt::Display for ObjectKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.element_name())
  }
}

/// Handle to an object in one of the two arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectRef {
  /// Index into the extension registry.
  Extension(usize),
  /// Index into a project's local object arena.
  Local(usize),
}

impl ObjectRef {
  pub fn is_extension(self) -> bool {
    matches!(self, ObjectRef::Extension(_))
  }
}

/// A stored attribute value.
///
/// Manifest attributes always arrive as text; lists and flags appear when
/// values are set programmatically or collected from child elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
  Flag(bool),
  Text(String),
  List(Vec<String>),
}

impl AttrValue {
  pub fn text(value: impl Into<String>) -> Self {
    AttrValue::Text(value.into())
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      AttrValue::Text(s) => Some(s),
      _ => None,
    }
  }

  /// Interpret the value as a boolean. Text accepts `true`/`false`.
  pub fn as_bool(&self) -> Option<bool> {
    match self {
      AttrValue::Flag(b) => Some(*b),
      AttrValue::Text(s) => match s.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
      },
      AttrValue::List(_) => None,
    }
  }

  /// Interpret the value as a list. Text is split on `;`.
  pub fn to_list(&self) -> Vec<String> {
    match self {
      AttrValue::List(items) => items.clone(),
      AttrValue::Text(s) => split_list(s, LIST_SEPARATOR),
      AttrValue::Flag(b) => vec![b.to_string()],
    }
  }
}

/// Split a separator-delimited list, trimming entries and dropping empty ones.
pub fn split_list(value: &str, separator: char) -> Vec<String> {
  value
    .split(separator)
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .collect()
}

/// Split a trailing `_<semver>` suffix off an ID.
///
/// `gnu.c.compiler_2.1.0` yields `("gnu.c.compiler", Some(2.1.0))`. IDs without
/// a parseable suffix are returned unchanged.
pub fn split_id_version(id: &str) -> (&str, Option<semver::Version>) {
  if let Some((base, suffix)) = id.rsplit_once('_')
    && !base.is_empty()
    && let Ok(version) = semver::Version::parse(suffix)
  {
    return (base, Some(version));
  }
  (id, None)
}

/// A single build object.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelObject {
  pub id: String,
  pub kind: ObjectKind,
  pub version: Option<semver::Version>,

  /// Declared superclass ID, kept even if it does not resolve.
  pub superclass_id: Option<String>,

  /// Resolved superclass handle.
  pub superclass: Option<ObjectRef>,

  pub parent: Option<ObjectRef>,

  /// Locally declared children, in declaration order.
  pub children: Vec<ObjectRef>,

  /// IDs of inherited children suppressed in this object.
  pub unused_children: Vec<String>,

  pub is_abstract: bool,

  /// Defined in a manifest rather than in project-local storage.
  pub extension: bool,

  /// Locally declared attributes. The display name is the `name` attribute.
  pub attributes: BTreeMap<String, AttrValue>,
}

impl ModelObject {
  pub fn new(kind: ObjectKind, id: impl Into<String>) -> Self {
    let id = id.into();
    let version = split_id_version(&id).1;
    Self {
      id,
      kind,
      version,
      superclass_id: None,
      superclass: None,
      parent: None,
      children: Vec::new(),
      unused_children: Vec::new(),
      is_abstract: false,
      extension: false,
      attributes: BTreeMap::new(),
    }
  }

  pub fn with_attr(mut self, name: impl Into<String>, value: AttrValue) -> Self {
    self.attributes.insert(name.into(), value);
    self
  }

  pub fn with_superclass(mut self, id: impl Into<String>) -> Self {
    self.superclass_id = Some(id.into());
    self
  }
}

/// Non-fatal defects found while loading the model.
///
/// None of these abort a load; the offending object is skipped or left with
/// an unresolved link, and the defect is recorded and logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelDiagnostic {
  #[error("duplicate {kind} id '{id}', keeping the first registration")]
  DuplicateId { kind: ObjectKind, id: String },

  #[error("{kind} '{id}' references unknown {attribute} '{target}'")]
  UnresolvedReference {
    kind: ObjectKind,
    id: String,
    attribute: String,
    target: String,
  },

  #[error("cyclic inheritance among {kind} objects: {}", chain.join(" -> "))]
  CyclicInheritance { kind: ObjectKind, chain: Vec<String> },

  #[error("{kind} element without an id was skipped")]
  MissingId { kind: ObjectKind },
}

/// Read access to build objects, shared by the registry and project models.
pub trait ModelView {
  /// The extension registry backing this view.
  fn registry(&self) -> &ModelRegistry;

  /// The view's local objects. Empty for the registry itself.
  fn local_objects(&self) -> &[ModelObject];

  fn object(&self, r: ObjectRef) -> &ModelObject {
    match r {
      ObjectRef::Extension(i) => self.registry().get(i),
      ObjectRef::Local(i) => &self.local_objects()[i],
    }
  }

  /// Effective attribute value: the nearest value on the superclass chain.
  fn effective_attr(&self, r: ObjectRef, name: &str) -> Option<&AttrValue> {
    let mut current = Some(r);
    // Local chains are bounded by the arena size; a longer walk is a loop.
    for _ in 0..=self.local_objects().len() {
      match current? {
        ObjectRef::Extension(i) => return self.registry().flattened_attr(i, name),
        local => {
          let object = self.object(local);
          if let Some(value) = object.attributes.get(name) {
            return Some(value);
          }
          current = object.superclass;
        }
      }
    }
    None
  }

  fn effective_str(&self, r: ObjectRef, name: &str) -> Option<&str> {
    self.effective_attr(r, name).and_then(AttrValue::as_str)
  }

  fn effective_bool(&self, r: ObjectRef, name: &str) -> Option<bool> {
    self.effective_attr(r, name).and_then(AttrValue::as_bool)
  }

  fn effective_list(&self, r: ObjectRef, name: &str) -> Vec<String> {
    self.effective_attr(r, name).map(AttrValue::to_list).unwrap_or_default()
  }

  /// Display name, falling back to the ID.
  fn name_of(&self, r: ObjectRef) -> &str {
    self.effective_str(r, "name").unwrap_or(&self.object(r).id)
  }

  /// Effective child list, optionally filtered to one kind.
  ///
  /// Inherited children come first, minus those listed in `unused_children`.
  /// A local child replaces an inherited one with the same ID, one it derives
  /// from, or (for project-local children) one standing in for the same
  /// extension object.
  fn effective_children(&self, r: ObjectRef, kind: Option<ObjectKind>) -> Vec<ObjectRef> {
    let children = match r {
      ObjectRef::Extension(i) => self.registry().merged_children(i).to_vec(),
      local => {
        let object = self.object(local);
        let inherited = match object.superclass {
          Some(superclass) => self.effective_children(superclass, None),
          None => Vec::new(),
        };
        merge_children(self, inherited, &object.unused_children, &object.children)
      }
    };

    match kind {
      Some(kind) => children.into_iter().filter(|c| self.object(*c).kind == kind).collect(),
      None => children,
    }
  }

  /// True if `r` is `ancestor` or has it on its superclass chain.
  fn derives_from(&self, r: ObjectRef, ancestor: ObjectRef) -> bool {
    let mut current = Some(r);
    let bound = self.local_objects().len() + self.registry().len() + 1;
    for _ in 0..bound {
      match current {
        Some(c) if c == ancestor => return true,
        Some(c) => current = self.object(c).superclass,
        None => return false,
      }
    }
    false
  }

  /// The most basic extension object `r` derives from, or `r` itself.
  fn extension_root(&self, r: ObjectRef) -> ObjectRef {
    let mut current = r;
    for _ in 0..=self.local_objects().len() {
      match (current, self.object(current).superclass) {
        (ObjectRef::Local(_), Some(superclass)) => current = superclass,
        _ => break,
      }
    }
    current
  }

  /// Sort key used uniformly for listing objects: kind, then name, then ID.
  fn sort_key(&self, r: ObjectRef) -> (ObjectKind, String, String) {
    let object = self.object(r);
    (object.kind, self.name_of(r).to_lowercase(), object.id.clone())
  }

  fn compare(&self, a: ObjectRef, b: ObjectRef) -> Ordering {
    self.sort_key(a).cmp(&self.sort_key(b))
  }
}

/// Merge inherited and local child lists.
pub(crate) fn merge_children<V: ModelView + ?Sized>(
  view: &V,
  inherited: Vec<ObjectRef>,
  unused: &[String],
  local: &[ObjectRef],
) -> Vec<ObjectRef> {
  let mut merged: Vec<ObjectRef> = inherited
    .into_iter()
    .filter(|c| !unused.iter().any(|id| *id == view.object(*c).id))
    .collect();

  for &child in local {
    let child_id = &view.object(child).id;
    // Local children are keyed by the extension object they stand in for.
    let child_root = (!child.is_extension()).then(|| view.extension_root(child));
    let replaced = merged.iter().position(|&existing| {
      view.object(existing).id == *child_id
        || view.derives_from(child, existing)
        || child_root.is_some_and(|root| view.extension_root(existing) == root)
    });
    match replaced {
      Some(pos) => merged[pos] = child,
      None => merged.push(child),
    }
  }

  merged
}
