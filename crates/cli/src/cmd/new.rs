//! `mbs new`: create a project file from a project type.

use std::collections::BTreeSet;
use std::process::ExitCode;

use anyhow::{Context as _, Result, anyhow, bail};

use mbs_lib::model::{ConfigurationView, ModelView};
use mbs_lib::project::{Nature, ProjectModel};

use super::Context;
use crate::output::{print_json, print_stat, print_success};

pub fn cmd_new(ctx: &Context, project_type: &str, name: Option<&str>, natures: &[String]) -> Result<ExitCode> {
  let path = ctx.project_file();
  if path.exists() {
    bail!("Project already exists: {}", path.display());
  }

  let natures = natures
    .iter()
    .map(|n| Nature::parse(n).ok_or_else(|| anyhow!("Unknown nature: {n} (expected c or cc)")))
    .collect::<Result<BTreeSet<_>>>()?;

  let name = match name {
    Some(name) => name.to_string(),
    None => ctx
      .project_dir
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .context("Cannot derive a project name from the directory; pass --name")?,
  };

  let project = ProjectModel::create(ctx.registry()?, project_type, &name, natures)
    .with_context(|| format!("Failed to create project from {project_type}"))?;
  ctx.save_project(&project)?;

  let configurations: Vec<&str> = project
    .configurations()
    .iter()
    .map(|c| ConfigurationView::new(&project, *c).name())
    .collect();

  if ctx.output.is_json() {
    print_json(&serde_json::json!({
      "name": project.name(),
      "projectType": project.object(project.project_type()).id,
      "configurations": configurations,
      "path": path,
    }))?;
  } else {
    print_success(&format!("Created project {name}"));
    print_stat("Type", project_type);
    print_stat("Configurations", &configurations.join(", "));
    print_stat("File", &path.display().to_string());
  }
  Ok(ExitCode::SUCCESS)
}
