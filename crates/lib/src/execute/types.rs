//! Types for build description execution.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::consts::OPTIMAL_PARALLELISM;
use crate::describe::StepId;
use crate::state::BuildStateError;

/// Errors that can occur while executing steps.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// The command ran and exited unsuccessfully.
  #[error("command failed with exit code {code:?}: {cmd}")]
  CmdFailed { cmd: String, code: Option<i32> },

  /// The command could not be started.
  #[error("failed to launch {cmd}: {source}")]
  Spawn {
    cmd: String,
    #[source]
    source: std::io::Error,
  },

  /// I/O error during execution.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// The step was interrupted by a cancellation request.
  #[error("cancelled")]
  Cancelled,

  /// The task running the step panicked.
  #[error("step panicked while running {cmd}")]
  Panicked { cmd: String },

  /// Build state could not be persisted.
  #[error(transparent)]
  State(#[from] BuildStateError),
}

/// Why a step did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "step", rename_all = "camelCase")]
pub enum SkipReason {
  /// Outputs are current.
  UpToDate,
  /// A step it depends on failed or was skipped because of a failure.
  DependencyFailed(StepId),
  /// The build stopped after a failure.
  Stopped,
  /// The build was cancelled.
  Cancelled,
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SkipReason::UpToDate => f.write_str("up to date"),
      SkipReason::DependencyFailed(id) => write!(f, "dependency {id} failed"),
      SkipReason::Stopped => f.write_str("stopped"),
      SkipReason::Cancelled => f.write_str("cancelled"),
    }
  }
}

/// Per-step execution state.
///
/// `Pending -> Ready -> Running -> {Succeeded, Failed}`; steps that never run
/// end as `Skipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum StepStatus {
  Pending,
  Ready,
  Running,
  Succeeded,
  Failed,
  Skipped(SkipReason),
}

impl StepStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, StepStatus::Succeeded | StepStatus::Failed | StepStatus::Skipped(_))
  }

  /// Dependents may start once a dependency is in one of these states.
  pub fn satisfies_dependents(self) -> bool {
    matches!(self, StepStatus::Succeeded | StepStatus::Skipped(SkipReason::UpToDate))
  }
}

impl fmt::Display for StepStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StepStatus::Pending => f.write_str("pending"),
      StepStatus::Ready => f.write_str("ready"),
      StepStatus::Running => f.write_str("running"),
      StepStatus::Succeeded => f.write_str("succeeded"),
      StepStatus::Failed => f.write_str("failed"),
      StepStatus::Skipped(reason) => write!(f, "skipped ({reason})"),
    }
  }
}

/// Aggregate outcome of one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildStatus {
  AllSucceeded,
  CompletedWithFailures,
  Cancelled,
  /// No step needed to run.
  NothingToBuild,
}

impl fmt::Display for BuildStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      BuildStatus::AllSucceeded => "all steps succeeded",
      BuildStatus::CompletedWithFailures => "completed with failures",
      BuildStatus::Cancelled => "cancelled",
      BuildStatus::NothingToBuild => "nothing to build",
    })
  }
}

/// Result of executing a build description.
#[derive(Debug)]
pub struct ExecuteSummary {
  pub status: BuildStatus,
  /// Final status of every step, indexed by step ID.
  pub steps: Vec<StepStatus>,
  /// Why each failed step failed.
  pub failures: Vec<(StepId, ExecuteError)>,
  pub duration: Duration,
}

impl ExecuteSummary {
  pub fn status_of(&self, id: StepId) -> StepStatus {
    self.steps[id.0]
  }

  pub fn succeeded(&self) -> usize {
    self.count(|s| s == StepStatus::Succeeded)
  }

  pub fn failed(&self) -> usize {
    self.count(|s| s == StepStatus::Failed)
  }

  pub fn skipped(&self) -> usize {
    self.count(|s| matches!(s, StepStatus::Skipped(_)))
  }

  fn count(&self, pred: impl Fn(StepStatus) -> bool) -> usize {
    self.steps.iter().filter(|s| pred(**s)).count()
  }
}

/// Configuration for build execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of steps running at once.
  ///
  /// Negative values pick the available parallelism; zero runs one step at a time.
  pub parallelism: i32,

  /// Keep building independent steps after a failure.
  pub resume_on_error: bool,

  /// Shell to use for command execution.
  /// If None, uses /bin/sh (Unix) or cmd.exe (Windows).
  pub shell: Option<String>,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: OPTIMAL_PARALLELISM,
      resume_on_error: false,
      shell: None,
    }
  }
}

impl ExecuteConfig {
  /// Worker count after resolving the sentinel values.
  pub fn max_workers(&self) -> usize {
    match self.parallelism {
      n if n < 0 => num_cpus(),
      0 => 1,
      n => n as usize,
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
