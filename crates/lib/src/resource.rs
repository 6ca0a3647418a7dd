//! Resource provider abstraction.
//!
//! The build description and the executor never touch the filesystem
//! directly for project files; they go through a [`ResourceProvider`] that
//! answers existence, content signatures and the source listing. Paths are
//! project-relative with `/` separators.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::trace;
use walkdir::WalkDir;

use crate::util::hash::{hash_bytes, hash_file};

#[derive(Debug, Error)]
pub enum ResourceError {
  #[error("failed to walk {root}: {message}")]
  Walk { root: PathBuf, message: String },

  #[error("failed to read {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("resource not found: {0}")]
  NotFound(String),
}

/// Access to project files.
pub trait ResourceProvider: Send + Sync {
  /// Project root; commands run here.
  fn root(&self) -> &Path;

  /// All candidate source files, sorted.
  fn sources(&self) -> Result<Vec<String>, ResourceError>;

  fn exists(&self, path: &str) -> bool;

  /// Content signature, or `None` when the resource does not exist.
  fn signature(&self, path: &str) -> Option<String>;

  fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError>;

  fn resolve(&self, path: &str) -> PathBuf {
    self.root().join(path)
  }
}

/// Resources that changed since the previous build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceDelta {
  pub added: BTreeSet<String>,
  pub changed: BTreeSet<String>,
  pub removed: BTreeSet<String>,
}

impl ResourceDelta {
  pub fn is_empty(&self) -> bool {
    self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
  }

  /// Added or changed.
  pub fn is_dirty(&self, path: &str) -> bool {
    self.added.contains(path) || self.changed.contains(path)
  }

  /// Compare the current sources against previously recorded signatures.
  pub fn compute(previous: &BTreeMap<String, String>, provider: &dyn ResourceProvider) -> Result<Self, ResourceError> {
    let mut delta = ResourceDelta::default();
    let current = provider.sources()?;

    for path in &current {
      match (previous.get(path), provider.signature(path)) {
        (None, _) => {
          delta.added.insert(path.clone());
        }
        (Some(old), Some(new)) if *old != new => {
          delta.changed.insert(path.clone());
        }
        _ => {}
      }
    }

    for path in previous.keys() {
      if !provider.exists(path) {
        delta.removed.insert(path.clone());
      }
    }

    Ok(delta)
  }
}

/// Convert a relative filesystem path to the `/`-separated form.
pub fn to_resource_path(path: &Path) -> String {
  path
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

/// Filesystem-backed provider rooted at a project directory.
///
/// Hidden entries and the listed build directories are not sources.
#[derive(Debug, Clone)]
pub struct FsResourceProvider {
  root: PathBuf,
  skip_dirs: BTreeSet<String>,
}

impl FsResourceProvider {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      skip_dirs: BTreeSet::new(),
    }
  }

  /// Skip a top-level directory, typically a configuration's build directory.
  pub fn skip_dir(mut self, dir: impl Into<String>) -> Self {
    self.skip_dirs.insert(dir.into());
    self
  }
}

impl ResourceProvider for FsResourceProvider {
  fn root(&self) -> &Path {
    &self.root
  }

  fn sources(&self) -> Result<Vec<String>, ResourceError> {
    let walker = WalkDir::new(&self.root)
      .sort_by_file_name()
      .into_iter()
      .filter_entry(|e| {
        if e.depth() == 0 {
          return true;
        }
        let name = e.file_name().to_string_lossy();
        !name.starts_with('.') && !(e.depth() == 1 && self.skip_dirs.contains(&*name))
      });

    let mut sources = Vec::new();
    for entry in walker {
      let entry = entry.map_err(|e| ResourceError::Walk {
        root: self.root.clone(),
        message: e.to_string(),
      })?;
      if entry.file_type().is_file()
        && let Ok(relative) = entry.path().strip_prefix(&self.root)
      {
        sources.push(to_resource_path(relative));
      }
    }
    sources.sort();
    trace!(root = %self.root.display(), count = sources.len(), "listed sources");
    Ok(sources)
  }

  fn exists(&self, path: &str) -> bool {
    self.resolve(path).is_file()
  }

  fn signature(&self, path: &str) -> Option<String> {
    hash_file(&self.resolve(path)).ok().map(|h| h.0)
  }

  fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
    fs::read(self.resolve(path)).map_err(|source| ResourceError::Read {
      path: path.to_string(),
      source,
    })
  }
}

/// In-memory provider, handy for planning builds without a checkout.
#[derive(Debug, Default)]
pub struct InMemoryResources {
  root: PathBuf,
  files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryResources {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      files: Mutex::new(BTreeMap::new()),
    }
  }

  pub fn insert(&self, path: &str, content: impl Into<Vec<u8>>) {
    self.lock().insert(path.to_string(), content.into());
  }

  pub fn remove(&self, path: &str) -> bool {
    self.lock().remove(path).is_some()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
    // A poisoned map is still a consistent map.
    self.files.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl ResourceProvider for InMemoryResources {
  fn root(&self) -> &Path {
    &self.root
  }

  fn sources(&self) -> Result<Vec<String>, ResourceError> {
    Ok(self.lock().keys().cloned().collect())
  }

  fn exists(&self, path: &str) -> bool {
    self.lock().contains_key(path)
  }

  fn signature(&self, path: &str) -> Option<String> {
    self.lock().get(path).map(|content| hash_bytes(content).0)
  }

  fn read(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
    self
      .lock()
      .get(path)
      .cloned()
      .ok_or_else(|| ResourceError::NotFound(path.to_string()))
  }
}
