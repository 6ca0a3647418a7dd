//! Typed accessors over generic build objects.
//!
//! Each view pairs a [`ModelView`] with an [`ObjectRef`] and reads effective
//! attributes by name, so it works the same for extension objects and for
//! project-local copies.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_COMMAND_LINE_PATTERN, EXTENSION_SEPARATOR};

use super::{AttrValue, ModelView, ObjectKind, ObjectRef, split_list};

/// Strip the leading dot from a file extension.
pub fn normalize_extension(ext: &str) -> &str {
  ext.trim_start_matches('.')
}

/// Option value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
  Boolean,
  Enumerated,
  String,
  StringList,
  IncludePath,
  DefinedSymbols,
  Libs,
  UserObjs,
}

impl ValueType {
  pub fn parse(value: &str) -> Option<Self> {
    Some(match value {
      "boolean" => ValueType::Boolean,
      "enumerated" => ValueType::Enumerated,
      "string" => ValueType::String,
      "stringList" => ValueType::StringList,
      "includePath" => ValueType::IncludePath,
      "definedSymbols" => ValueType::DefinedSymbols,
      "libs" => ValueType::Libs,
      "userObjs" => ValueType::UserObjs,
      _ => return None,
    })
  }

  pub fn is_list(self) -> bool {
    matches!(
      self,
      ValueType::StringList | ValueType::IncludePath | ValueType::DefinedSymbols | ValueType::Libs | ValueType::UserObjs
    )
  }

  /// Value types that feed include/symbol discovery for the editor side.
  pub fn affects_scanner_info(self) -> bool {
    matches!(self, ValueType::IncludePath | ValueType::DefinedSymbols)
  }
}

impl fmt::Display for ValueType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ValueType::Boolean => "boolean",
      ValueType::Enumerated => "enumerated",
      ValueType::String => "string",
      ValueType::StringList => "stringList",
      ValueType::IncludePath => "includePath",
      ValueType::DefinedSymbols => "definedSymbols",
      ValueType::Libs => "libs",
      ValueType::UserObjs => "userObjs",
    };
    f.write_str(name)
  }
}

/// Which project natures a tool applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatureFilter {
  Both,
  C,
  Cc,
}

impl NatureFilter {
  fn parse(value: Option<&str>) -> Self {
    match value {
      Some("c") => NatureFilter::C,
      Some("cc") => NatureFilter::Cc,
      _ => NatureFilter::Both,
    }
  }
}

#[derive(Clone, Copy)]
pub struct ToolView<'a> {
  view: &'a dyn ModelView,
  pub r: ObjectRef,
}

impl<'a> ToolView<'a> {
  pub fn new(view: &'a dyn ModelView, r: ObjectRef) -> Self {
    Self { view, r }
  }

  pub fn id(&self) -> &'a str {
    &self.view.object(self.r).id
  }

  pub fn name(&self) -> &'a str {
    self.view.name_of(self.r)
  }

  pub fn is_abstract(&self) -> bool {
    self.view.object(self.r).is_abstract
  }

  pub fn command(&self) -> &'a str {
    self.view.effective_str(self.r, "command").unwrap_or_default()
  }

  pub fn command_line_pattern(&self) -> &'a str {
    self
      .view
      .effective_str(self.r, "commandLinePattern")
      .unwrap_or(DEFAULT_COMMAND_LINE_PATTERN)
  }

  pub fn output_flag(&self) -> &'a str {
    self.view.effective_str(self.r, "outputFlag").unwrap_or_default()
  }

  pub fn nature_filter(&self) -> NatureFilter {
    NatureFilter::parse(self.view.effective_str(self.r, "natureFilter"))
  }

  /// Extension of the dependency file the tool can emit, if any.
  pub fn dependency_extension(&self) -> Option<&'a str> {
    self
      .view
      .effective_str(self.r, "dependencyExtension")
      .filter(|e| !e.is_empty())
  }

  pub fn options(&self) -> Vec<ObjectRef> {
    self.view.effective_children(self.r, Some(ObjectKind::Option))
  }

  pub fn input_types(&self) -> Vec<InputTypeView<'a>> {
    self
      .view
      .effective_children(self.r, Some(ObjectKind::InputType))
      .into_iter()
      .map(|r| InputTypeView { view: self.view, r })
      .collect()
  }

  pub fn output_types(&self) -> Vec<OutputTypeView<'a>> {
    self
      .view
      .effective_children(self.r, Some(ObjectKind::OutputType))
      .into_iter()
      .map(|r| OutputTypeView { view: self.view, r })
      .collect()
  }

  pub fn primary_input_type(&self) -> Option<InputTypeView<'a>> {
    let inputs = self.input_types();
    inputs.iter().find(|i| i.is_primary()).or(inputs.first()).copied()
  }

  pub fn primary_output_type(&self) -> Option<OutputTypeView<'a>> {
    let outputs = self.output_types();
    outputs.iter().find(|o| o.is_primary()).or(outputs.first()).copied()
  }

  pub fn input_type_for_extension(&self, ext: &str) -> Option<InputTypeView<'a>> {
    self.input_types().into_iter().find(|i| i.accepts(ext))
  }

  pub fn input_type_for_variable(&self, variable: &str) -> Option<InputTypeView<'a>> {
    self
      .input_types()
      .into_iter()
      .find(|i| i.build_variable() == Some(variable))
  }

  /// Whether any input type consumes files with this extension.
  pub fn builds_file_type(&self, ext: &str) -> bool {
    self.input_type_for_extension(ext).is_some()
  }

  /// The output type produced from the given input type.
  ///
  /// An output type naming the input type as `primaryInputType` wins,
  /// otherwise the primary output type is used.
  pub fn output_type_for(&self, input: Option<&InputTypeView<'a>>) -> Option<OutputTypeView<'a>> {
    if let Some(input) = input {
      let input_root = self.view.object(self.view.extension_root(input.r)).id.as_str();
      if let Some(output) = self
        .output_types()
        .into_iter()
        .find(|o| o.primary_input_type().is_some_and(|id| id == input.id() || id == input_root))
      {
        return Some(output);
      }
    }
    self.primary_output_type()
  }

  /// The extension this tool produces for an input extension.
  ///
  /// The result keeps the caller's convention: `.c` yields `.o`, `c` yields `o`.
  pub fn output_extension(&self, input_ext: &str) -> Option<String> {
    let input = self.input_type_for_extension(input_ext)?;
    let output = self.output_type_for(Some(&input))?;
    let ext = output.extensions().into_iter().next()?;
    if input_ext.starts_with('.') {
      Some(format!(".{ext}"))
    } else {
      Some(ext)
    }
  }
}

#[derive(Clone, Copy)]
pub struct InputTypeView<'a> {
  view: &'a dyn ModelView,
  pub r: ObjectRef,
}

impl<'a> InputTypeView<'a> {
  pub fn id(&self) -> &'a str {
    &self.view.object(self.r).id
  }

  /// Source extensions, without leading dots.
  pub fn sources(&self) -> Vec<String> {
    self
      .view
      .effective_str(self.r, "sources")
      .map(|s| {
        split_list(s, EXTENSION_SEPARATOR)
          .into_iter()
          .map(|e| normalize_extension(&e).to_string())
          .collect()
      })
      .unwrap_or_default()
  }

  pub fn accepts(&self, ext: &str) -> bool {
    let ext = normalize_extension(ext);
    self.sources().iter().any(|s| s == ext)
  }

  pub fn build_variable(&self) -> Option<&'a str> {
    self.view.effective_str(self.r, "buildVariable").filter(|v| !v.is_empty())
  }

  /// All inputs of this type are passed to a single invocation.
  pub fn multiple_of_type(&self) -> bool {
    self.view.effective_bool(self.r, "multipleOfType").unwrap_or(false)
  }

  pub fn is_primary(&self) -> bool {
    self.view.effective_bool(self.r, "primaryInput").unwrap_or(false)
  }

  /// Extra inputs passed on the command line.
  pub fn additional_inputs(&self) -> Vec<String> {
    self.view.effective_list(self.r, "additionalInput")
  }

  /// Extra inputs that only affect freshness.
  pub fn additional_dependencies(&self) -> Vec<String> {
    self.view.effective_list(self.r, "additionalDependency")
  }
}

#[derive(Clone, Copy)]
pub struct OutputTypeView<'a> {
  view: &'a dyn ModelView,
  pub r: ObjectRef,
}

impl<'a> OutputTypeView<'a> {
  pub fn id(&self) -> &'a str {
    &self.view.object(self.r).id
  }

  /// Output extensions, without leading dots.
  pub fn extensions(&self) -> Vec<String> {
    self
      .view
      .effective_str(self.r, "outputs")
      .map(|s| {
        split_list(s, EXTENSION_SEPARATOR)
          .into_iter()
          .map(|e| normalize_extension(&e).to_string())
          .collect()
      })
      .unwrap_or_default()
  }

  pub fn build_variable(&self) -> Option<&'a str> {
    self.view.effective_str(self.r, "buildVariable").filter(|v| !v.is_empty())
  }

  pub fn name_pattern(&self) -> Option<&'a str> {
    self.view.effective_str(self.r, "namePattern").filter(|v| !v.is_empty())
  }

  pub fn name_provider(&self) -> Option<&'a str> {
    self.view.effective_str(self.r, "nameProvider").filter(|v| !v.is_empty())
  }

  pub fn output_names(&self) -> Vec<String> {
    self.view.effective_list(self.r, "outputNames")
  }

  pub fn output_prefix(&self) -> &'a str {
    self.view.effective_str(self.r, "outputPrefix").unwrap_or_default()
  }

  /// ID of an option whose value supplies the output names.
  pub fn option(&self) -> Option<&'a str> {
    self.view.effective_str(self.r, "option").filter(|v| !v.is_empty())
  }

  pub fn is_primary(&self) -> bool {
    self.view.effective_bool(self.r, "primaryOutput").unwrap_or(false)
  }

  pub fn primary_input_type(&self) -> Option<&'a str> {
    self.view.effective_str(self.r, "primaryInputType").filter(|v| !v.is_empty())
  }
}

#[derive(Clone, Copy)]
pub struct ToolChainView<'a> {
  view: &'a dyn ModelView,
  pub r: ObjectRef,
}

impl<'a> ToolChainView<'a> {
  pub fn new(view: &'a dyn ModelView, r: ObjectRef) -> Self {
    Self { view, r }
  }

  pub fn tools(&self) -> Vec<ToolView<'a>> {
    self
      .view
      .effective_children(self.r, Some(ObjectKind::Tool))
      .into_iter()
      .map(|r| ToolView::new(self.view, r))
      .collect()
  }

  /// IDs of the candidate target tools, in preference order.
  pub fn target_tool_ids(&self) -> Vec<String> {
    self.view.effective_list(self.r, "targetTool")
  }

  /// The tool producing the configuration artifact.
  ///
  /// The first listed ID matching a tool (or a tool's extension ancestor) wins.
  pub fn target_tool(&self) -> Option<ToolView<'a>> {
    let tools = self.tools();
    self.target_tool_ids().iter().find_map(|id| {
      tools
        .iter()
        .find(|t| t.id() == id.as_str() || self.view.object(self.view.extension_root(t.r)).id == *id)
        .copied()
    })
  }
}

#[derive(Clone, Copy)]
pub struct ConfigurationView<'a> {
  view: &'a dyn ModelView,
  pub r: ObjectRef,
}

impl<'a> ConfigurationView<'a> {
  pub fn new(view: &'a dyn ModelView, r: ObjectRef) -> Self {
    Self { view, r }
  }

  pub fn id(&self) -> &'a str {
    &self.view.object(self.r).id
  }

  pub fn name(&self) -> &'a str {
    self.view.name_of(self.r)
  }

  pub fn tool_chain(&self) -> Option<ToolChainView<'a>> {
    self
      .view
      .effective_children(self.r, Some(ObjectKind::ToolChain))
      .into_iter()
      .next()
      .map(|r| ToolChainView::new(self.view, r))
  }

  pub fn resource_configurations(&self) -> Vec<ObjectRef> {
    self
      .view
      .effective_children(self.r, Some(ObjectKind::ResourceConfiguration))
  }

  pub fn artifact_name(&self) -> Option<&'a str> {
    self.view.effective_str(self.r, "artifactName").filter(|v| !v.is_empty())
  }

  pub fn artifact_extension(&self) -> &'a str {
    self.view.effective_str(self.r, "artifactExtension").unwrap_or_default()
  }

  /// Build directory relative to the project root; defaults to the name.
  pub fn build_dir(&self) -> &'a str {
    self
      .view
      .effective_str(self.r, "buildDir")
      .filter(|v| !v.is_empty())
      .unwrap_or_else(|| self.name())
  }

  /// Environment for tool invocations, from `KEY=VALUE;...`.
  pub fn environment(&self) -> BTreeMap<String, String> {
    self
      .view
      .effective_attr(self.r, "environment")
      .map(AttrValue::to_list)
      .unwrap_or_default()
      .into_iter()
      .filter_map(|entry| {
        entry
          .split_once('=')
          .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
      })
      .collect()
  }
}

#[derive(Clone, Copy)]
pub struct OptionView<'a> {
  view: &'a dyn ModelView,
  pub r: ObjectRef,
}

impl<'a> OptionView<'a> {
  pub fn new(view: &'a dyn ModelView, r: ObjectRef) -> Self {
    Self { view, r }
  }

  pub fn id(&self) -> &'a str {
    &self.view.object(self.r).id
  }

  pub fn name(&self) -> &'a str {
    self.view.name_of(self.r)
  }

  /// Declared value type; `string` when absent or unrecognized.
  pub fn value_type(&self) -> ValueType {
    self
      .view
      .effective_str(self.r, "valueType")
      .and_then(ValueType::parse)
      .unwrap_or(ValueType::String)
  }

  pub fn command(&self) -> &'a str {
    self.view.effective_str(self.r, "command").unwrap_or_default()
  }

  pub fn command_false(&self) -> &'a str {
    self.view.effective_str(self.r, "commandFalse").unwrap_or_default()
  }

  pub fn category(&self) -> Option<&'a str> {
    self.view.effective_str(self.r, "category")
  }

  pub fn enum_values(&self) -> Vec<String> {
    self.view.effective_list(self.r, "enumValues")
  }

  pub fn enum_command(&self, id: &str) -> &'a str {
    self
      .view
      .effective_str(self.r, &format!("enum:{id}"))
      .unwrap_or_default()
  }

  /// The explicitly stored value, nearest on the chain.
  pub fn stored_value(&self) -> Option<&'a AttrValue> {
    self.view.effective_attr(self.r, "value")
  }

  pub fn default_value(&self) -> Option<&'a AttrValue> {
    self.view.effective_attr(self.r, "defaultValue")
  }
}
