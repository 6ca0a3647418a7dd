//! Command execution for build steps.
//!
//! Steps run through a shell so tool command lines can use quoting and
//! redirection. The process inherits the caller's environment plus the
//! configuration's variables, and is killed when the build is cancelled.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use super::cancel::CancelToken;
use super::types::ExecuteError;
use crate::describe::StepId;

/// A resolved command to run for one step.
#[derive(Debug, Clone)]
pub struct CommandRequest {
  pub step: StepId,
  pub command: String,
  pub working_dir: PathBuf,
  pub environment: BTreeMap<String, String>,
  /// Absolute output paths; their directories are created before running.
  pub outputs: Vec<PathBuf>,
}

/// What a finished command produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl CommandOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

/// Runs step commands.
///
/// Implementations must return [`ExecuteError::Cancelled`] promptly once the
/// token is cancelled, terminating any process they started.
pub trait CommandRunner: Send + Sync {
  fn run(
    &self,
    request: CommandRequest,
    cancel: CancelToken,
  ) -> impl Future<Output = Result<CommandOutput, ExecuteError>> + Send;
}

/// Runs commands with the system shell.
#[derive(Debug, Clone, Default)]
pub struct ShellCommandRunner {
  shell: Option<String>,
}

impl ShellCommandRunner {
  pub fn new(shell: Option<String>) -> Self {
    Self { shell }
  }
}

impl CommandRunner for ShellCommandRunner {
  async fn run(&self, request: CommandRequest, mut cancel: CancelToken) -> Result<CommandOutput, ExecuteError> {
    info!(step = %request.step, cmd = %request.command, "executing command");

    for output in &request.outputs {
      if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
      }
    }

    let (shell_cmd, shell_args) = get_shell(self.shell.as_deref());

    let mut command = Command::new(&shell_cmd);
    command
      .args(&shell_args)
      .arg(&request.command)
      .current_dir(&request.working_dir)
      .envs(&request.environment)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    debug!(shell = %shell_cmd, working_dir = ?request.working_dir, "spawning process");

    let child = command.spawn().map_err(|source| ExecuteError::Spawn {
      cmd: request.command.clone(),
      source,
    })?;

    // Dropping the wait future drops the child, which kills it.
    let output = tokio::select! {
      output = child.wait_with_output() => output?,
      _ = cancel.cancelled() => {
        debug!(step = %request.step, "command killed by cancellation");
        return Err(ExecuteError::Cancelled);
      }
    };

    let result = CommandOutput {
      code: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !result.success() {
      if !result.stderr.is_empty() {
        debug!(stderr = %result.stderr, "command stderr");
      }
      if !result.stdout.is_empty() {
        debug!(stdout = %result.stdout, "command stdout");
      }
    }

    Ok(result)
  }
}

/// Get the shell command and arguments for the current platform.
///
/// An override picks its argument style from the shell's name.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    ("cmd.exe".to_string(), vec!["/C".to_string()])
  }
}
