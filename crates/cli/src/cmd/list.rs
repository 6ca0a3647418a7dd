//! `mbs list`: extension objects known to the registry.

use std::process::ExitCode;

use anyhow::{Result, anyhow};
use serde::Serialize;

use mbs_lib::model::{ModelView, ObjectKind};

use super::Context;
use crate::output::{print_info, print_json, symbols};

#[derive(Serialize)]
struct Listed<'a> {
  id: &'a str,
  name: &'a str,
  #[serde(rename = "abstract")]
  is_abstract: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  superclass: Option<&'a str>,
}

pub fn cmd_list(ctx: &Context, kind: &str, all: bool) -> Result<ExitCode> {
  let kind = ObjectKind::from_element_name(kind).ok_or_else(|| anyhow!("Unknown element kind: {kind}"))?;
  let registry = ctx.registry()?;

  let listed: Vec<Listed<'_>> = registry
    .objects_of_kind(kind)
    .into_iter()
    .map(|r| {
      let object = registry.object(r);
      Listed {
        id: &object.id,
        name: registry.name_of(r),
        is_abstract: object.is_abstract,
        superclass: object.superclass_id.as_deref(),
      }
    })
    .filter(|l| all || !l.is_abstract)
    .collect();

  if ctx.output.is_json() {
    print_json(&listed)?;
    return Ok(ExitCode::SUCCESS);
  }

  if listed.is_empty() {
    print_info(&format!("No {} objects found.", kind.element_name()));
    return Ok(ExitCode::SUCCESS);
  }

  for item in &listed {
    let suffix = if item.is_abstract { " (abstract)" } else { "" };
    if item.name == item.id {
      println!("  {} {}{}", symbols::INFO, item.id, suffix);
    } else {
      println!("  {} {} - {}{}", symbols::INFO, item.id, item.name, suffix);
    }
  }
  Ok(ExitCode::SUCCESS)
}
