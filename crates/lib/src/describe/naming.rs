//! Output file naming.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::consts::WILDCARD;
use crate::model::{ObjectRef, OutputTypeView, ToolView};
use crate::project::{OptionValue, ProjectModel};

/// Computes output names for output types that name a provider.
pub trait NameProvider: Send + Sync {
  /// Names (not paths) of the outputs produced from `primary_input`.
  fn output_names(&self, tool: &ToolView<'_>, primary_input: &str) -> Vec<String>;
}

pub(crate) type NameProviders = HashMap<String, Arc<dyn NameProvider>>;

/// File stem of a resource path: `src/a.c` -> `a`.
pub(crate) fn stem(path: &str) -> &str {
  Path::new(path).file_stem().and_then(|s| s.to_str()).unwrap_or(path)
}

/// Replace the wildcard with the input's stem.
pub(crate) fn resolve_wildcard(pattern: &str, stem: &str) -> String {
  pattern.replace(WILDCARD, stem)
}

/// Output names for one invocation, highest priority source first:
/// the output-name option, the name pattern, the name provider, the
/// explicit names list, then `<stem>.<first output extension>`.
/// The output prefix is prepended to every name.
pub(crate) fn output_names(
  project: &ProjectModel,
  holder: ObjectRef,
  output: &OutputTypeView<'_>,
  primary_input: &str,
  providers: &NameProviders,
) -> Vec<String> {
  let stem = stem(primary_input);
  let tool = ToolView::new(project, holder);

  let names = option_names(project, holder, output)
    .or_else(|| output.name_pattern().map(|p| vec![resolve_wildcard(p, stem)]))
    .or_else(|| {
      let id = output.name_provider()?;
      match providers.get(id) {
        Some(provider) => Some(provider.output_names(&tool, primary_input)).filter(|n| !n.is_empty()),
        None => {
          warn!(provider = id, tool = tool.id(), "name provider is not registered");
          None
        }
      }
    })
    .or_else(|| {
      let names = output.output_names();
      (!names.is_empty()).then(|| names.iter().map(|n| resolve_wildcard(n, stem)).collect())
    })
    .unwrap_or_else(|| match output.extensions().first() {
      Some(ext) => vec![format!("{stem}.{ext}")],
      None => vec![stem.to_string()],
    });

  let prefix = output.output_prefix();
  names.into_iter().map(|name| with_prefix(prefix, &name)).collect()
}

fn option_names(project: &ProjectModel, holder: ObjectRef, output: &OutputTypeView<'_>) -> Option<Vec<String>> {
  let option = project.find_option_by_key(holder, output.option()?)?;
  match project.option_value(option) {
    OptionValue::String(s) | OptionValue::Enumerated(s) if !s.trim().is_empty() => Some(vec![s.trim().to_string()]),
    OptionValue::List(items) if !items.is_empty() => Some(items),
    _ => None,
  }
}

/// Prepend `prefix` to the file-name part of `name`.
pub(crate) fn with_prefix(prefix: &str, name: &str) -> String {
  if prefix.is_empty() {
    return name.to_string();
  }
  match name.rsplit_once('/') {
    Some((dir, file)) if !file.starts_with(prefix) => format!("{dir}/{prefix}{file}"),
    None if !name.starts_with(prefix) => format!("{prefix}{name}"),
    _ => name.to_string(),
  }
}

/// Artifact file name of a configuration's target step.
pub(crate) fn artifact_name(name: &str, extension: &str, prefix: &str) -> String {
  let extension = extension.trim_start_matches('.');
  let file = if extension.is_empty() {
    name.to_string()
  } else {
    format!("{name}.{extension}")
  };
  with_prefix(prefix, &file)
}
