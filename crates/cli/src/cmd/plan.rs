//! `mbs plan`: show a configuration's build description without running it.

use std::process::ExitCode;

use anyhow::Result;

use mbs_lib::describe::BuildFlags;
use mbs_lib::lock::{LockMode, ProjectLock};

use super::{Context, plan_configuration, select_configuration};
use crate::output::{print_info, print_json, print_plan};

pub fn cmd_plan(ctx: &Context, configuration: Option<&str>, rebuild: bool) -> Result<ExitCode> {
  let project = ctx.open_project()?;
  let cfg = select_configuration(&project, configuration)?;

  let _lock = ProjectLock::acquire(&ctx.project_dir, LockMode::Shared, "mbs plan", None)?;
  let flags = BuildFlags {
    rebuild,
    ..Default::default()
  };
  let planned = plan_configuration(&ctx.project_dir, &project, cfg, flags)?;
  let desc = &planned.description;

  if ctx.output.is_json() {
    print_json(&serde_json::json!({
      "configuration": desc.configuration,
      "buildDir": desc.build_dir,
      "steps": desc.steps(),
      "staleOutputs": desc.stale_outputs,
    }))?;
    return Ok(ExitCode::SUCCESS);
  }

  if desc.is_empty() {
    print_info("Nothing to build: no sources match the configuration's tools.");
    return Ok(ExitCode::SUCCESS);
  }

  print_plan(desc);
  Ok(ExitCode::SUCCESS)
}
