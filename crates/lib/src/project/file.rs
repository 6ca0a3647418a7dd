//! Project file persistence.
//!
//! The project file stores only project-local objects; references to
//! extension objects are stored by ID and re-resolved against the registry on
//! load. A missing extension object makes the whole file unusable, as does a
//! format version with a different major number.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::consts::PROJECT_FORMAT_VERSION;
use crate::model::{AttrValue, ModelObject, ModelRegistry, ModelView, ObjectKind, ObjectRef};

use super::{Nature, ProjectError, ProjectModel};

/// Reference to a superclass, either in the registry or in the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "lowercase")]
pub enum StoredRef {
  Extension(String),
  Local(String),
}

/// One project-local object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
  pub id: String,
  pub kind: ObjectKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub superclass: Option<StoredRef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent: Option<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub attributes: BTreeMap<String, AttrValue>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub unused_children: Vec<String>,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub is_abstract: bool,
}

/// Serialized form of a [`ProjectModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
  pub version: String,
  pub name: String,
  pub project_type: String,
  #[serde(default)]
  pub natures: BTreeSet<Nature>,
  #[serde(default)]
  pub default_configuration: Option<String>,
  #[serde(default)]
  pub rebuild_needed: BTreeSet<String>,
  #[serde(default)]
  pub next_id: u64,
  /// Objects in creation order; a child always follows its parent.
  pub objects: Vec<StoredObject>,
}

/// Hook run on files whose version differs only in minor or patch number.
pub trait ProjectUpgrader {
  fn upgrade(&self, file: &mut ProjectFile, from: &semver::Version) -> Result<(), ProjectError>;
}

/// Accepts older minor versions as they are.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultUpgrader;

impl ProjectUpgrader for DefaultUpgrader {
  fn upgrade(&self, _file: &mut ProjectFile, from: &semver::Version) -> Result<(), ProjectError> {
    info!(from = %from, to = PROJECT_FORMAT_VERSION, "upgrading project file");
    Ok(())
  }
}

fn supported_version() -> semver::Version {
  // The constant is a literal checked by tests.
  semver::Version::parse(PROJECT_FORMAT_VERSION).unwrap_or_else(|_| semver::Version::new(0, 0, 0))
}

impl ProjectModel {
  /// Serialize the live part of the model.
  pub fn to_file(&self) -> ProjectFile {
    let live = self.live_objects();
    let id_of = |r: ObjectRef| self.object(r).id.clone();

    let objects = self
      .local_objects()
      .iter()
      .enumerate()
      .filter(|(i, _)| live.contains(i))
      .map(|(_, object)| StoredObject {
        id: object.id.clone(),
        kind: object.kind,
        superclass: object.superclass.map(|s| match s {
          ObjectRef::Extension(_) => StoredRef::Extension(id_of(s)),
          ObjectRef::Local(_) => StoredRef::Local(id_of(s)),
        }),
        parent: object.parent.map(id_of),
        attributes: object.attributes.clone(),
        unused_children: object.unused_children.clone(),
        is_abstract: object.is_abstract,
      })
      .collect();

    ProjectFile {
      version: PROJECT_FORMAT_VERSION.to_string(),
      name: self.name.clone(),
      project_type: self.object(self.project_type).id.clone(),
      natures: self.natures.clone(),
      default_configuration: self.default_configuration.clone(),
      rebuild_needed: self.rebuild_needed.clone(),
      next_id: self.next_id,
      objects,
    }
  }

  /// Indices of local objects reachable from a configuration root.
  fn live_objects(&self) -> HashSet<usize> {
    let mut live = HashSet::new();
    let mut stack: Vec<ObjectRef> = self.configurations.clone();
    while let Some(r) = stack.pop() {
      if let ObjectRef::Local(i) = r
        && live.insert(i)
      {
        stack.extend(self.objects[i].children.iter().copied());
      }
    }
    live
  }

  /// Rebuild a model from its serialized form.
  pub fn from_file(
    registry: Arc<ModelRegistry>,
    mut file: ProjectFile,
    upgrader: &dyn ProjectUpgrader,
  ) -> Result<Self, ProjectError> {
    let found =
      semver::Version::parse(&file.version).map_err(|_| ProjectError::InvalidVersion(file.version.clone()))?;
    let supported = supported_version();
    if found.major != supported.major {
      return Err(ProjectError::VersionIncompatible {
        found: file.version,
        supported: PROJECT_FORMAT_VERSION.to_string(),
      });
    }
    if found != supported {
      upgrader.upgrade(&mut file, &found)?;
      file.version = PROJECT_FORMAT_VERSION.to_string();
    }

    let project_type = registry
      .lookup(ObjectKind::ProjectType, &file.project_type)
      .ok_or_else(|| ProjectError::UnknownProjectType(file.project_type.clone()))?;

    let mut project = Self::empty(registry, &file.name, project_type, file.natures.clone());
    project.next_id = file.next_id;
    project.default_configuration = file.default_configuration.clone();
    project.rebuild_needed = file.rebuild_needed.clone();

    // Construct everything, then link: references may point forward.
    let mut index: HashMap<String, usize> = HashMap::new();
    for stored in &file.objects {
      if index.insert(stored.id.clone(), project.objects.len()).is_some() {
        return Err(ProjectError::DuplicateObject(stored.id.clone()));
      }
      let mut object = ModelObject::new(stored.kind, stored.id.clone());
      object.attributes = stored.attributes.clone();
      object.unused_children = stored.unused_children.clone();
      object.is_abstract = stored.is_abstract;
      project.objects.push(object);
    }

    for (i, stored) in file.objects.iter().enumerate() {
      let missing = |target: &str| ProjectError::MissingReference {
        kind: stored.kind,
        id: stored.id.clone(),
        target: target.to_string(),
      };

      let superclass = match &stored.superclass {
        Some(StoredRef::Extension(id)) => Some(project.registry.lookup(stored.kind, id).ok_or_else(|| missing(id))?),
        Some(StoredRef::Local(id)) => Some(ObjectRef::Local(*index.get(id).ok_or_else(|| missing(id))?)),
        None => None,
      };
      let parent = match &stored.parent {
        Some(id) => Some(*index.get(id).ok_or_else(|| missing(id))?),
        None => None,
      };

      let object = &mut project.objects[i];
      object.superclass_id = stored.superclass.as_ref().map(|s| match s {
        StoredRef::Extension(id) | StoredRef::Local(id) => id.clone(),
      });
      object.superclass = superclass;
      object.parent = parent.map(ObjectRef::Local);

      match parent {
        Some(p) => project.objects[p].children.push(ObjectRef::Local(i)),
        None if stored.kind == ObjectKind::Configuration => project.configurations.push(ObjectRef::Local(i)),
        None => warn!(id = %stored.id, kind = %stored.kind, "ignoring detached project object"),
      }
    }

    project.check_local_cycles()?;

    debug!(
      project = %project.name,
      objects = project.objects.len(),
      configurations = project.configurations.len(),
      "loaded project model"
    );
    Ok(project)
  }

  fn check_local_cycles(&self) -> Result<(), ProjectError> {
    for (i, object) in self.objects.iter().enumerate() {
      let mut current = object.superclass;
      let mut steps = 0;
      while let Some(ObjectRef::Local(j)) = current {
        steps += 1;
        if j == i || steps > self.objects.len() {
          return Err(ProjectError::CyclicReference(object.id.clone()));
        }
        current = self.objects[j].superclass;
      }
    }
    Ok(())
  }

  /// Load a project file from disk.
  pub fn load(registry: Arc<ModelRegistry>, path: &Path, upgrader: &dyn ProjectUpgrader) -> Result<Self, ProjectError> {
    let content = fs::read_to_string(path).map_err(|source| ProjectError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let file: ProjectFile = serde_json::from_str(&content).map_err(ProjectError::Parse)?;
    Self::from_file(registry, file, upgrader)
  }

  /// Save the project file atomically.
  pub fn save(&self, path: &Path) -> Result<(), ProjectError> {
    let write_err = |source| ProjectError::Write {
      path: path.to_path_buf(),
      source,
    };

    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent).map_err(write_err)?;
    }

    let content = serde_json::to_string_pretty(&self.to_file()).map_err(ProjectError::Serialize)?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &content).map_err(write_err)?;
    fs::rename(&temp_path, path).map_err(write_err)?;

    debug!(path = %path.display(), "saved project file");
    Ok(())
  }
}
