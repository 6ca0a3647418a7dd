//! Persisted per-configuration build state.
//!
//! For every output resource the state records the signature of each input
//! as it was when the output was last produced successfully. A step is up to
//! date when its outputs exist and its inputs still carry those signatures.
//!
//! # Storage Layout
//!
//! ```text
//! <project>/.mbs/state/
//! └── <configuration-id>.json
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{BUILD_STATE_VERSION, PROJECT_DATA_DIR, STATE_DIR};

#[derive(Debug, Error)]
pub enum BuildStateError {
  #[error("failed to read build state: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write build state: {0}")]
  Write(#[source] io::Error),

  #[error("failed to create build state directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to parse build state: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize build state: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported build state version: {0}")]
  UnsupportedVersion(u32),
}

/// What an output was last built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
  /// Signature of the output itself after the build.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub signature: Option<String>,

  /// Input path -> input signature at build time.
  #[serde(default)]
  pub inputs: BTreeMap<String, String>,
}

/// Build state of one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildState {
  pub version: u32,
  pub configuration: String,
  #[serde(default)]
  pub resources: BTreeMap<String, ResourceRecord>,
}

impl BuildState {
  pub fn new(configuration: impl Into<String>) -> Self {
    Self {
      version: BUILD_STATE_VERSION,
      configuration: configuration.into(),
      resources: BTreeMap::new(),
    }
  }

  pub fn record(&self, output: &str) -> Option<&ResourceRecord> {
    self.resources.get(output)
  }

  pub fn set_record(&mut self, output: impl Into<String>, record: ResourceRecord) {
    self.resources.insert(output.into(), record);
  }

  pub fn forget(&mut self, output: &str) -> bool {
    self.resources.remove(output).is_some()
  }

  /// Every input signature recorded by any output.
  ///
  /// This is the baseline a change delta is computed against.
  pub fn known_signatures(&self) -> BTreeMap<String, String> {
    let mut known = BTreeMap::new();
    for record in self.resources.values() {
      for (path, signature) in &record.inputs {
        known.insert(path.clone(), signature.clone());
      }
    }
    known
  }
}

/// Stores [`BuildState`] files for a project.
#[derive(Debug, Clone)]
pub struct BuildStateStore {
  base_path: PathBuf,
}

impl BuildStateStore {
  pub fn new(base_path: PathBuf) -> Self {
    Self { base_path }
  }

  /// Store at the default location inside a project.
  pub fn for_project(project_root: &Path) -> Self {
    Self::new(project_root.join(PROJECT_DATA_DIR).join(STATE_DIR))
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  fn state_path(&self, configuration: &str) -> PathBuf {
    let file_name: String = configuration
      .chars()
      .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
      .collect();
    self.base_path.join(format!("{file_name}.json"))
  }

  /// Load a configuration's state; a missing file is an empty state.
  pub fn load(&self, configuration: &str) -> Result<BuildState, BuildStateError> {
    let path = self.state_path(configuration);

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BuildState::new(configuration)),
      Err(e) => return Err(BuildStateError::Read(e)),
    };

    let state: BuildState = serde_json::from_str(&content).map_err(BuildStateError::Parse)?;
    if state.version != BUILD_STATE_VERSION {
      return Err(BuildStateError::UnsupportedVersion(state.version));
    }

    debug!(configuration, resources = state.resources.len(), "loaded build state");
    Ok(state)
  }

  /// Save a state atomically: readers see the old or the new file, never a mix.
  pub fn save(&self, state: &BuildState) -> Result<(), BuildStateError> {
    fs::create_dir_all(&self.base_path).map_err(BuildStateError::CreateDir)?;

    let path = self.state_path(&state.configuration);
    let temp_path = path.with_extension("json.tmp");

    let content = serde_json::to_string_pretty(state).map_err(BuildStateError::Serialize)?;
    fs::write(&temp_path, &content).map_err(BuildStateError::Write)?;
    fs::rename(&temp_path, &path).map_err(BuildStateError::Write)?;

    debug!(configuration = %state.configuration, resources = state.resources.len(), "saved build state");
    Ok(())
  }

  /// Delete a configuration's state, e.g. for a clean build.
  pub fn remove(&self, configuration: &str) -> Result<(), BuildStateError> {
    match fs::remove_file(self.state_path(configuration)) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(BuildStateError::Write(e)),
    }
  }
}
