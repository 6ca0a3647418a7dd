//! Well-known directories.
//!
//! Manifests are searched in `MBS_MANIFEST_PATH` when set (a platform path
//! list), otherwise in `<config dir>/manifests`.

use std::env;
use std::path::PathBuf;

use crate::consts::APP_NAME;

/// Overrides the manifest search path.
pub const MANIFEST_PATH_ENV: &str = "MBS_MANIFEST_PATH";

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  env::var_os("USERPROFILE").map(PathBuf::from)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  env::var_os("HOME").map(PathBuf::from)
}

/// Returns the directory for configuration files for the application
#[cfg(windows)]
pub fn config_dir() -> Option<PathBuf> {
  env::var_os("APPDATA").map(|appdata| PathBuf::from(appdata).join(APP_NAME))
}

/// Returns the directory for configuration files for the application
#[cfg(not(windows))]
pub fn config_dir() -> Option<PathBuf> {
  let config_home = env::var_os("XDG_CONFIG_HOME")
    .filter(|v| !v.is_empty())
    .map(PathBuf::from)
    .or_else(|| home_dir().map(|home| home.join(".config")))?;
  Some(config_home.join(APP_NAME))
}

/// Directories to load manifests from, in search order.
pub fn manifest_dirs() -> Vec<PathBuf> {
  if let Some(list) = env::var_os(MANIFEST_PATH_ENV).filter(|v| !v.is_empty()) {
    return env::split_paths(&list).filter(|p| !p.as_os_str().is_empty()).collect();
  }
  config_dir().map(|dir| vec![dir.join("manifests")]).unwrap_or_default()
}
