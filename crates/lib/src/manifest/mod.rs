//! Manifest source for extension build objects.
//!
//! A manifest is an ordered sequence of declarative element records (kind,
//! attributes, children). The registry consumes these records at load time; it
//! does not care where they came from. This module also reads them from JSON
//! files so the CLI has something to load.

mod types;

pub use types::*;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Errors that can occur while reading manifest files.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse manifest {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// Load the element records from a single JSON manifest file.
///
/// The file holds a JSON array of [`ManifestElement`]s.
pub fn load_manifest_file(path: &Path) -> Result<Vec<ManifestElement>, ManifestError> {
  let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
    path: path.to_path_buf(),
    source,
  })?;

  serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

/// Load every `*.json` manifest below the given directories.
///
/// Files are visited in sorted path order so registration order (and with it
/// duplicate-ID resolution) is stable between runs. Missing directories are
/// skipped.
pub fn load_manifest_dirs(dirs: &[PathBuf]) -> Result<Vec<ManifestElement>, ManifestError> {
  let mut elements = Vec::new();

  for dir in dirs {
    if !dir.is_dir() {
      debug!(dir = %dir.display(), "manifest directory does not exist, skipping");
      continue;
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
      .sort_by_file_name()
      .into_iter()
      .filter_map(|entry| match entry {
        Ok(entry) => Some(entry),
        Err(e) => {
          warn!(error = %e, "failed to walk manifest directory");
          None
        }
      })
      .filter(|entry| entry.file_type().is_file())
      .map(|entry| entry.into_path())
      .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
      .collect();
    files.sort();

    for file in files {
      debug!(path = %file.display(), "loading manifest");
      elements.extend(load_manifest_file(&file)?);
    }
  }

  Ok(elements)
}
