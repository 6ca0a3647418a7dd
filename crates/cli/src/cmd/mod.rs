//! Subcommand implementations and the project plumbing they share.

mod build;
mod list;
mod new;
mod option;
mod plan;

pub use build::{BuildArgs, cmd_build};
pub use list::cmd_list;
pub use new::cmd_new;
pub use option::cmd_option;
pub use plan::cmd_plan;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow, bail};
use tracing::debug;

use mbs_lib::consts::PROJECT_FILE_NAME;
use mbs_lib::describe::{BuildDescription, BuildFlags, DescriptionBuilder};
use mbs_lib::manifest::load_manifest_dirs;
use mbs_lib::model::{ConfigurationView, ModelRegistry, ObjectRef};
use mbs_lib::platform::paths::manifest_dirs;
use mbs_lib::project::{DefaultUpgrader, ProjectModel};
use mbs_lib::resource::{FsResourceProvider, ResourceDelta};
use mbs_lib::state::{BuildState, BuildStateStore};

use crate::output::{OutputFormat, print_warning};

/// Options shared by every subcommand.
pub struct Context {
  pub project_dir: PathBuf,
  pub manifests: Vec<PathBuf>,
  pub output: OutputFormat,
}

impl Context {
  pub fn project_file(&self) -> PathBuf {
    self.project_dir.join(PROJECT_FILE_NAME)
  }

  /// Load the extension registry, reporting manifest defects as warnings.
  pub fn registry(&self) -> Result<Arc<ModelRegistry>> {
    let dirs = if self.manifests.is_empty() {
      manifest_dirs()
    } else {
      self.manifests.clone()
    };
    debug!(?dirs, "manifest search path");

    let elements = load_manifest_dirs(&dirs).context("Failed to load manifests")?;
    let registry = ModelRegistry::load(&elements);
    for diagnostic in registry.diagnostics() {
      print_warning(&diagnostic.to_string());
    }
    Ok(Arc::new(registry))
  }

  pub fn open_project(&self) -> Result<ProjectModel> {
    let path = self.project_file();
    if !path.exists() {
      bail!(
        "No project in {}. Run 'mbs new <project-type>' first.",
        self.project_dir.display()
      );
    }
    ProjectModel::load(self.registry()?, &path, &DefaultUpgrader)
      .with_context(|| format!("Failed to load project: {}", path.display()))
  }

  pub fn save_project(&self, project: &ProjectModel) -> Result<()> {
    let path = self.project_file();
    project
      .save(&path)
      .with_context(|| format!("Failed to save project: {}", path.display()))
  }
}

/// Pick a configuration by ID or name, or the project's default.
pub fn select_configuration(project: &ProjectModel, key: Option<&str>) -> Result<ObjectRef> {
  match key {
    Some(key) => project
      .find_configuration(key)
      .ok_or_else(|| anyhow!("Unknown configuration: {key}")),
    None => project
      .default_configuration()
      .ok_or_else(|| anyhow!("Project has no configurations")),
  }
}

/// Everything needed to run or show one configuration's build.
pub struct Planned {
  pub description: BuildDescription,
  pub state: BuildState,
  pub store: BuildStateStore,
  pub provider: FsResourceProvider,
}

/// Compute a configuration's build description against its recorded state.
pub fn plan_configuration(
  project_dir: &Path,
  project: &ProjectModel,
  configuration: ObjectRef,
  flags: BuildFlags,
) -> Result<Planned> {
  let cfg = ConfigurationView::new(project, configuration);
  let store = BuildStateStore::for_project(project_dir);
  let state = store
    .load(cfg.id())
    .with_context(|| format!("Failed to load build state for {}", cfg.name()))?;

  let provider = FsResourceProvider::new(project_dir).skip_dir(cfg.build_dir());
  let delta = ResourceDelta::compute(&state.known_signatures(), &provider).context("Failed to scan sources")?;
  debug!(
    added = delta.added.len(),
    changed = delta.changed.len(),
    removed = delta.removed.len(),
    "source changes"
  );

  let description = DescriptionBuilder::new(project)
    .build(configuration, &state, &delta, &provider, flags)
    .with_context(|| format!("Failed to plan configuration {}", cfg.name()))?;

  Ok(Planned {
    description,
    state,
    store,
    provider,
  })
}
