//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Directory holding the fixture manifests.
pub fn manifests_path() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join("manifests")
}

/// Isolated project directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn empty() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// A `demo.exe` project named `app` with the given sources.
  pub fn with_project(files: &[(&str, &str)]) -> Self {
    let env = Self::empty();
    env.mbs_cmd().args(["new", "demo.exe", "--name", "app"]).assert().success();
    for (path, content) in files {
      env.write_file(path, content);
    }
    env
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.root().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn read_file(&self, relative_path: &str) -> String {
    std::fs::read_to_string(self.root().join(relative_path)).unwrap()
  }

  /// An `mbs` command pointed at this project and the fixture manifests.
  pub fn mbs_cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("mbs");
    cmd
      .arg("-C")
      .arg(self.root())
      .arg("-m")
      .arg(manifests_path())
      .env_remove("RUST_LOG")
      .env_remove("MBS_MANIFEST_PATH");
    cmd
  }

  /// Run a command with `-o json` and parse its stdout.
  pub fn json(&self, args: &[&str]) -> serde_json::Value {
    let output = self.mbs_cmd().args(["-o", "json"]).args(args).output().unwrap();
    assert!(
      output.status.success(),
      "mbs {args:?} failed: {}",
      String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
  }
}
