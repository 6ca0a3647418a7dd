//! Per-project build locking.
//!
//! Builds of one project must not overlap: two executors flushing the same
//! build state would lose records. `mbs build` holds an exclusive lock while
//! it runs; read-only commands such as `mbs plan` take a shared one.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{APP_NAME, PROJECT_DATA_DIR};

const LOCK_FILENAME: &str = ".lock";
const LOCK_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

/// Written into the lock file by the exclusive holder and cleared on release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  /// Configuration being built, when the holder builds one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub configuration: Option<String>,
  pub project: PathBuf,
}

impl LockMetadata {
  /// Seconds since the holder took the lock.
  pub fn held_for_secs(&self) -> u64 {
    unix_now().saturating_sub(self.started_at_unix)
  }
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "project {} is busy: {command}{} (PID {pid}, running for {held_for_secs}s)\n\
     If no {} process is running, remove the lock file:\n  {}",
    .project.display(),
    .configuration.as_deref().map(|c| format!(" is building {c}")).unwrap_or_default(),
    APP_NAME,
    .lock_path.display()
  )]
  Busy {
    project: PathBuf,
    command: String,
    configuration: Option<String>,
    pid: u32,
    held_for_secs: u64,
    lock_path: PathBuf,
  },

  #[error(
    "project {} is in use by another {} command (a plan, or a build still starting)\n\
     If no {} process is running, remove the lock file:\n  {}",
    .project.display(),
    APP_NAME,
    APP_NAME,
    .lock_path.display()
  )]
  InUse { project: PathBuf, lock_path: PathBuf },

  #[error("failed to create project data directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// A held project lock; released when dropped.
#[derive(Debug)]
pub struct ProjectLock {
  file: File,
  mode: LockMode,
  lock_path: PathBuf,
}

impl ProjectLock {
  /// Try to lock the project rooted at `project_root` without blocking.
  ///
  /// `configuration` names what an exclusive holder builds; it shows up in
  /// the error another process gets while the lock is held.
  pub fn acquire(
    project_root: &Path,
    mode: LockMode,
    command: &str,
    configuration: Option<&str>,
  ) -> Result<Self, LockError> {
    let data_dir = project_root.join(PROJECT_DATA_DIR);
    let lock_path = data_dir.join(LOCK_FILENAME);

    std::fs::create_dir_all(&data_dir).map_err(LockError::CreateDir)?;

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(LockError::OpenFile)?;

    if let Err(err) = try_lock(&file, mode) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(busy_error(project_root, &lock_path));
      }
      return Err(LockError::LockFailed(err));
    }

    if mode == LockMode::Exclusive {
      let metadata = LockMetadata {
        version: LOCK_VERSION,
        pid: std::process::id(),
        started_at_unix: unix_now(),
        command: command.to_string(),
        configuration: configuration.map(str::to_string),
        project: project_root.to_path_buf(),
      };
      write_metadata(&file, &metadata)?;
    }

    debug!(path = ?lock_path, ?mode, configuration, "acquired project lock");
    Ok(Self { file, mode, lock_path })
  }

  /// Who holds the lock of `project_root` exclusively, if anyone recorded it.
  ///
  /// Reads without locking, so the answer can be stale by the time it returns.
  pub fn holder(project_root: &Path) -> Option<LockMetadata> {
    let path = project_root.join(PROJECT_DATA_DIR).join(LOCK_FILENAME);
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
  }

  /// Read the metadata through the held handle.
  ///
  /// Opening the file again would fail on Windows, where locks are mandatory.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

impl Drop for ProjectLock {
  fn drop(&mut self) {
    // Still locked here; the handle closes after this.
    if self.mode == LockMode::Exclusive
      && let Err(e) = self.file.set_len(0)
    {
      debug!(path = ?self.lock_path, error = %e, "could not clear lock metadata");
    }
  }
}

fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}

fn write_metadata(file: &File, metadata: &LockMetadata) -> Result<(), LockError> {
  file.set_len(0).map_err(LockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, metadata).map_err(|e| LockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(LockError::WriteMetadata)?;
  Ok(())
}

fn busy_error(project_root: &Path, lock_path: &Path) -> LockError {
  match ProjectLock::holder(project_root) {
    Some(holder) => LockError::Busy {
      project: project_root.to_path_buf(),
      held_for_secs: holder.held_for_secs(),
      command: holder.command,
      configuration: holder.configuration,
      pid: holder.pid,
      lock_path: lock_path.to_path_buf(),
    },
    None => LockError::InUse {
      project: project_root.to_path_buf(),
      lock_path: lock_path.to_path_buf(),
    },
  }
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = match mode {
    LockMode::Shared => LOCKFILE_FAIL_IMMEDIATELY,
    LockMode::Exclusive => LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
  };

  // SAFETY: OVERLAPPED is plain data and valid when zeroed; the handle is open.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  #[test]
  fn exclusive_lock_records_the_build() {
    let project = TempDir::new().unwrap();
    let lock = ProjectLock::acquire(project.path(), LockMode::Exclusive, "mbs build", Some("Debug")).unwrap();

    assert_eq!(lock.lock_path(), project.path().join(".mbs").join(".lock"));
    let metadata = lock.read_metadata().unwrap();
    assert_eq!(metadata.version, LOCK_VERSION);
    assert_eq!(metadata.command, "mbs build");
    assert_eq!(metadata.configuration.as_deref(), Some("Debug"));
    assert_eq!(metadata.pid, std::process::id());
    assert_eq!(metadata.project, project.path());
    assert!(metadata.held_for_secs() < 60);
  }

  #[test]
  fn shared_locks_coexist() {
    let project = TempDir::new().unwrap();
    let first = ProjectLock::acquire(project.path(), LockMode::Shared, "mbs plan", None).unwrap();
    let second = ProjectLock::acquire(project.path(), LockMode::Shared, "mbs plan", None).unwrap();
    assert_eq!(first.lock_path(), second.lock_path());
    assert!(ProjectLock::holder(project.path()).is_none());
  }

  #[cfg(unix)]
  #[test]
  fn busy_project_names_the_running_build() {
    let project = TempDir::new().unwrap();
    let _held = ProjectLock::acquire(project.path(), LockMode::Exclusive, "mbs build", Some("Release")).unwrap();

    let err = ProjectLock::acquire(project.path(), LockMode::Exclusive, "mbs build", Some("Debug")).unwrap_err();
    match &err {
      LockError::Busy {
        command,
        configuration,
        pid,
        ..
      } => {
        assert_eq!(command, "mbs build");
        assert_eq!(configuration.as_deref(), Some("Release"));
        assert_eq!(*pid, std::process::id());
      }
      other => panic!("expected a busy project, got {other:?}"),
    }
    assert!(err.to_string().contains("mbs build is building Release"));
  }

  #[cfg(unix)]
  #[test]
  fn reader_blocks_build_without_stale_holder() {
    let project = TempDir::new().unwrap();
    drop(ProjectLock::acquire(project.path(), LockMode::Exclusive, "mbs build", Some("Debug")).unwrap());
    assert!(ProjectLock::holder(project.path()).is_none());

    let _reader = ProjectLock::acquire(project.path(), LockMode::Shared, "mbs plan", None).unwrap();
    let err = ProjectLock::acquire(project.path(), LockMode::Exclusive, "mbs build", None).unwrap_err();
    assert!(matches!(err, LockError::InUse { .. }), "{err:?}");
  }

  #[test]
  fn lock_released_on_drop() {
    let project = TempDir::new().unwrap();
    {
      let _lock = ProjectLock::acquire(project.path(), LockMode::Exclusive, "first", None).unwrap();
    }
    let lock = ProjectLock::acquire(project.path(), LockMode::Exclusive, "second", None).unwrap();
    assert_eq!(lock.read_metadata().unwrap().command, "second");
  }
}
