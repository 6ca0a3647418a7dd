//! Manifest element records.
//!
//! An element mirrors one declaration in a plugin manifest:
//!
//! ```json
//! {
//!   "kind": "tool",
//!   "attributes": { "id": "gnu.c.compiler", "superClass": "base.compiler" },
//!   "children": [ { "kind": "option", "attributes": { "id": "gnu.c.opt.debug" } } ]
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A declarative element record from a manifest source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestElement {
  /// Element name, e.g. `tool`, `toolChain`, `option`.
  pub kind: String,

  /// Raw attribute values as declared.
  #[serde(default)]
  pub attributes: BTreeMap<String, String>,

  /// Nested element records, in declaration order.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub children: Vec<ManifestElement>,
}

impl ManifestElement {
  pub fn new(kind: impl Into<String>) -> Self {
    Self {
      kind: kind.into(),
      attributes: BTreeMap::new(),
      children: Vec::new(),
    }
  }

  /// Builder-style attribute setter.
  pub fn attr_set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.attributes.insert(name.into(), value.into());
    self
  }

  /// Builder-style child appender.
  pub fn child(mut self, child: ManifestElement) -> Self {
    self.children.push(child);
    self
  }

  pub fn attr(&self, name: &str) -> Option<&str> {
    self.attributes.get(name).map(String::as_str)
  }

  pub fn id(&self) -> Option<&str> {
    self.attr("id").filter(|id| !id.is_empty())
  }
}
