//! Option value store.
//!
//! Values are read from the nearest option object in the scope's hierarchy:
//! resource configuration, then configuration, then the extension option's
//! default chain. Writes never touch shared objects: when the option holding
//! the current value is not owned by the scope's holder, a derived option is
//! created under the holder with the original as its superclass.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::{AttrValue, ModelObject, ModelView, ObjectKind, ObjectRef, OptionView, ValueType, split_list};

use super::ProjectModel;

/// A concrete option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum OptionValue {
  Boolean(bool),
  String(String),
  Enumerated(String),
  List(Vec<String>),
}

impl OptionValue {
  /// Parse user-supplied text for an option of the given type.
  ///
  /// Lists are `;`-separated.
  pub fn from_text(value_type: ValueType, text: &str) -> Result<Self, OptionError> {
    match value_type {
      ValueType::Boolean => match text.trim() {
        "true" | "1" | "on" => Ok(OptionValue::Boolean(true)),
        "false" | "0" | "off" => Ok(OptionValue::Boolean(false)),
        other => Err(OptionError::InvalidText {
          value_type,
          text: other.to_string(),
        }),
      },
      ValueType::Enumerated => Ok(OptionValue::Enumerated(text.trim().to_string())),
      ValueType::String => Ok(OptionValue::String(text.to_string())),
      _ => Ok(OptionValue::List(split_list(text, ';'))),
    }
  }

  fn from_attr(value_type: ValueType, attr: Option<&AttrValue>, option: &OptionView<'_>) -> Self {
    match value_type {
      ValueType::Boolean => OptionValue::Boolean(attr.and_then(AttrValue::as_bool).unwrap_or(false)),
      ValueType::Enumerated => OptionValue::Enumerated(
        attr
          .and_then(AttrValue::as_str)
          .map(str::to_string)
          .or_else(|| option.enum_values().into_iter().next())
          .unwrap_or_default(),
      ),
      ValueType::String => OptionValue::String(match attr {
        Some(AttrValue::Text(s)) => s.clone(),
        Some(AttrValue::List(items)) => items.join(" "),
        Some(AttrValue::Flag(b)) => b.to_string(),
        None => String::new(),
      }),
      _ => OptionValue::List(attr.map(AttrValue::to_list).unwrap_or_default()),
    }
  }

  pub(crate) fn to_attr(&self) -> AttrValue {
    match self {
      OptionValue::Boolean(b) => AttrValue::Flag(*b),
      OptionValue::String(s) | OptionValue::Enumerated(s) => AttrValue::Text(s.clone()),
      OptionValue::List(items) => AttrValue::List(items.clone()),
    }
  }

  fn type_name(&self) -> &'static str {
    match self {
      OptionValue::Boolean(_) => "boolean",
      OptionValue::String(_) => "string",
      OptionValue::Enumerated(_) => "enumerated",
      OptionValue::List(_) => "list",
    }
  }
}

impl fmt::Display for OptionValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OptionValue::Boolean(b) => write!(f, "{b}"),
      OptionValue::String(s) | OptionValue::Enumerated(s) => f.write_str(s),
      OptionValue::List(items) => f.write_str(&items.join(";")),
    }
  }
}

/// Errors from reading or writing option values.
///
/// A failed write leaves the model unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
  #[error("{0} is not a configuration or resource configuration of this project")]
  InvalidScope(String),

  #[error("{holder} is not available in {scope}")]
  UnknownHolder { scope: String, holder: String },

  #[error("{holder} has no option {option}")]
  UnknownOption { holder: String, option: String },

  #[error("option {option} expects a {expected} value, got {found}")]
  TypeMismatch {
    option: String,
    expected: ValueType,
    found: &'static str,
  },

  #[error("'{value}' is not a valid value for option {option}")]
  InvalidEnumValue { option: String, value: String },

  #[error("cannot read '{text}' as a {value_type} value")]
  InvalidText { value_type: ValueType, text: String },
}

/// Notified when an option that affects include/symbol discovery changes.
pub trait OptionChangeListener: Send + Sync {
  fn option_changed(&self, configuration: &str, option: &str, value: &OptionValue);
}

impl ProjectModel {
  /// Read an option's effective value in a scope.
  pub fn get_value(&self, scope: ObjectRef, holder: ObjectRef, option: ObjectRef) -> Result<OptionValue, OptionError> {
    let holder = self.holder_in_scope(scope, holder, true)?;
    let option = self.find_option(holder, option)?;
    Ok(self.option_value(option))
  }

  /// Effective value of a specific option object.
  pub fn option_value(&self, option: ObjectRef) -> OptionValue {
    let view = OptionView::new(self, option);
    let stored = view.stored_value().or(view.default_value());
    OptionValue::from_attr(view.value_type(), stored, &view)
  }

  /// Set an option's value in a scope.
  ///
  /// Returns the option object now holding the value, which is a newly
  /// derived option when the scope did not own one yet. Setting a value equal
  /// to the current one changes nothing and returns the current holder.
  pub fn set_value(
    &mut self,
    scope: ObjectRef,
    holder: ObjectRef,
    option: ObjectRef,
    value: OptionValue,
  ) -> Result<ObjectRef, OptionError> {
    let holder = self.holder_in_scope(scope, holder, false)?;
    let current = self.find_option(holder, option)?;
    let value_type = OptionView::new(self, current).value_type();
    let value = self.check_value(current, value_type, value)?;

    if self.option_value(current) == value {
      return Ok(current);
    }

    let owned = !current.is_extension() && self.object(current).parent == Some(holder);
    let target = if owned {
      current
    } else {
      let base = self.object(self.extension_root(current)).id.clone();
      let id = self.derived_id(&base);
      let mut derived = ModelObject::new(ObjectKind::Option, id);
      derived.superclass_id = Some(self.object(current).id.clone());
      derived.superclass = Some(current);
      derived.parent = Some(holder);
      let derived = self.push_local(derived);
      self.attach_child(holder, derived);
      derived
    };

    if let ObjectRef::Local(i) = target {
      self.objects[i].attributes.insert("value".to_string(), value.to_attr());
    }
    self.mark_rebuild(scope);

    let option_id = self.object(self.extension_root(target)).id.clone();
    debug!(option = %option_id, holder = %self.object(holder).id, value = %value, derived = !owned, "option value set");

    if value_type.affects_scanner_info() {
      let configuration = self.object(self.configuration_of(scope)).id.clone();
      for listener in &self.listeners {
        listener.option_changed(&configuration, &option_id, &value);
      }
    }

    Ok(target)
  }

  /// Effective options of a holder.
  pub fn options_of(&self, holder: ObjectRef) -> Vec<ObjectRef> {
    self.effective_children(holder, Some(ObjectKind::Option))
  }

  /// Find a holder's option by local ID, extension ID or name.
  pub fn find_option_by_key(&self, holder: ObjectRef, key: &str) -> Option<ObjectRef> {
    self.options_of(holder).into_iter().find(|&o| {
      self.object(o).id == key || self.object(self.extension_root(o)).id == key || self.name_of(o) == key
    })
  }

  /// The option object in `holder` standing in for `option`.
  pub(crate) fn find_option(&self, holder: ObjectRef, option: ObjectRef) -> Result<ObjectRef, OptionError> {
    let root = self.extension_root(option);
    self
      .options_of(holder)
      .into_iter()
      .find(|&o| o == option || self.extension_root(o) == root || self.derives_from(o, option))
      .ok_or_else(|| OptionError::UnknownOption {
        holder: self.object(holder).id.clone(),
        option: self.object(option).id.clone(),
      })
  }

  fn check_value(&self, option: ObjectRef, value_type: ValueType, value: OptionValue) -> Result<OptionValue, OptionError> {
    let view = OptionView::new(self, option);
    let mismatch = |found: &OptionValue| OptionError::TypeMismatch {
      option: view.id().to_string(),
      expected: value_type,
      found: found.type_name(),
    };

    match (value_type, value) {
      (ValueType::Boolean, v @ OptionValue::Boolean(_)) => Ok(v),
      (ValueType::String, v @ OptionValue::String(_)) => Ok(v),
      (ValueType::Enumerated, OptionValue::Enumerated(id) | OptionValue::String(id)) => {
        let allowed = view.enum_values();
        if !allowed.is_empty() && !allowed.contains(&id) {
          return Err(OptionError::InvalidEnumValue {
            option: view.id().to_string(),
            value: id,
          });
        }
        Ok(OptionValue::Enumerated(id))
      }
      (vt, v @ OptionValue::List(_)) if vt.is_list() => Ok(v),
      (_, v) => Err(mismatch(&v)),
    }
  }
}
