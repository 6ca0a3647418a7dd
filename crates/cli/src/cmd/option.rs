//! `mbs option`: list, read or change tool option values.
//!
//! Values set with `--file` apply to that source file only; reads with
//! `--file` fall back to the configuration when the file has no override.

use std::process::ExitCode;

use anyhow::{Context as _, Result, anyhow};

use mbs_lib::model::{ObjectRef, OptionView};
use mbs_lib::project::{OptionValue, ProjectModel};

use super::{Context, select_configuration};
use crate::output::{print_json, print_success};

pub fn cmd_option(
  ctx: &Context,
  tool: &str,
  option: Option<&str>,
  value: Option<&str>,
  configuration: Option<&str>,
  file: Option<&str>,
) -> Result<ExitCode> {
  let mut project = ctx.open_project()?;
  let cfg = select_configuration(&project, configuration)?;

  let Some(option) = option else {
    let scope = read_scope(&project, cfg, file);
    let holder = find_tool(&project, scope, tool)?;
    return list_options(ctx, &project, scope, holder);
  };

  let Some(value) = value else {
    let scope = read_scope(&project, cfg, file);
    let holder = find_tool(&project, scope, tool)?;
    let option = find_option(&project, holder, option)?;
    let current = project.get_value(scope, holder, option)?;
    if ctx.output.is_json() {
      print_json(&current)?;
    } else {
      println!("{current}");
    }
    return Ok(ExitCode::SUCCESS);
  };

  let scope = match file {
    Some(path) => project.create_resource_configuration(cfg, path),
    None => cfg,
  };
  let holder = find_tool(&project, scope, tool)?;
  let option = find_option(&project, holder, option)?;
  let parsed = OptionValue::from_text(OptionView::new(&project, option).value_type(), value)?;
  let name = OptionView::new(&project, option).name().to_string();

  project
    .set_value(scope, holder, option, parsed.clone())
    .with_context(|| format!("Failed to set {name}"))?;
  ctx.save_project(&project)?;

  if ctx.output.is_json() {
    print_json(&parsed)?;
  } else {
    print_success(&format!("{name} = {parsed}"));
  }
  Ok(ExitCode::SUCCESS)
}

fn read_scope(project: &ProjectModel, cfg: ObjectRef, file: Option<&str>) -> ObjectRef {
  file
    .and_then(|path| project.resource_configuration(cfg, path))
    .unwrap_or(cfg)
}

fn find_tool(project: &ProjectModel, scope: ObjectRef, key: &str) -> Result<ObjectRef> {
  project
    .find_tool(scope, key)
    .ok_or_else(|| anyhow!("Unknown tool: {key}"))
}

fn find_option(project: &ProjectModel, holder: ObjectRef, key: &str) -> Result<ObjectRef> {
  project
    .find_option_by_key(holder, key)
    .ok_or_else(|| anyhow!("Unknown option: {key}"))
}

fn list_options(ctx: &Context, project: &ProjectModel, scope: ObjectRef, holder: ObjectRef) -> Result<ExitCode> {
  let mut rows = Vec::new();
  for option in project.options_of(holder) {
    let view = OptionView::new(project, option);
    let value = project.get_value(scope, holder, option)?;
    rows.push((view.id().to_string(), view.name().to_string(), view.value_type(), value));
  }

  if ctx.output.is_json() {
    let json: Vec<_> = rows
      .iter()
      .map(|(id, name, value_type, value)| {
        serde_json::json!({ "id": id, "name": name, "valueType": value_type, "value": value })
      })
      .collect();
    print_json(&json)?;
  } else {
    for (id, name, _, value) in &rows {
      println!("  {name} ({id}) = {value}");
    }
  }
  Ok(ExitCode::SUCCESS)
}
