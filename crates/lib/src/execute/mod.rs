//! Build description execution.
//!
//! Steps needing a build go through a ready queue: a step becomes ready once
//! every step producing its inputs has succeeded or was already up to date.
//! At most `max_workers` steps run at once; a serial build is simply the
//! one-worker case of the same loop. It handles:
//! - failure propagation (stop, or skip dependents and resume)
//! - cooperative cancellation, killing in-flight processes
//! - recording build state for completed steps as one batch

mod cancel;
mod console;
mod runner;
mod types;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use crate::describe::{BuildDescription, BuildStep, StepId};
use crate::resource::ResourceProvider;
use crate::state::{BuildState, BuildStateStore, ResourceRecord};

pub use cancel::{CancelHandle, CancelToken};
pub use console::{ConsoleSink, ErrorParser, GnuErrorParser, OutputStream, ProblemMarker, Severity, TracingConsole};
pub use runner::{CommandOutput, CommandRequest, CommandRunner, ShellCommandRunner};
pub use types::{BuildStatus, ExecuteConfig, ExecuteError, ExecuteSummary, SkipReason, StepStatus};

/// Runs build descriptions.
pub struct Executor<R> {
  config: ExecuteConfig,
  runner: Arc<R>,
  console: Arc<dyn ConsoleSink>,
  parser: Option<Arc<dyn ErrorParser>>,
  store: Option<BuildStateStore>,
}

impl Executor<ShellCommandRunner> {
  /// An executor running commands through the configured shell.
  pub fn with_shell(config: ExecuteConfig) -> Self {
    let runner = Arc::new(ShellCommandRunner::new(config.shell.clone()));
    Self::new(config, runner)
  }
}

impl<R: CommandRunner + 'static> Executor<R> {
  pub fn new(config: ExecuteConfig, runner: Arc<R>) -> Self {
    Self {
      config,
      runner,
      console: Arc::new(TracingConsole),
      parser: None,
      store: None,
    }
  }

  pub fn with_console(mut self, console: Arc<dyn ConsoleSink>) -> Self {
    self.console = console;
    self
  }

  pub fn with_error_parser(mut self, parser: Arc<dyn ErrorParser>) -> Self {
    self.parser = Some(parser);
    self
  }

  /// Save the build state to `store` at the end of every build.
  pub fn with_state_store(mut self, store: BuildStateStore) -> Self {
    self.store = Some(store);
    self
  }

  pub fn config(&self) -> &ExecuteConfig {
    &self.config
  }

  /// Execute every step of `desc` that needs a build.
  ///
  /// `state` is updated once, after the last step finished: succeeded steps
  /// get fresh records, failed steps and their skipped dependents lose theirs,
  /// and outputs no step produces anymore are forgotten. This also happens
  /// for cancelled builds.
  pub async fn execute(
    &self,
    desc: &BuildDescription,
    state: &mut BuildState,
    provider: &dyn ResourceProvider,
    cancel: CancelToken,
  ) -> Result<ExecuteSummary, ExecuteError> {
    let started = Instant::now();
    let steps = desc.steps();
    let max = self.config.max_workers();

    let mut status: Vec<StepStatus> = steps
      .iter()
      .map(|s| {
        if s.needs_rebuild {
          StepStatus::Pending
        } else {
          StepStatus::Skipped(SkipReason::UpToDate)
        }
      })
      .collect();
    let needed = status.iter().filter(|s| **s == StepStatus::Pending).count();

    info!(
      configuration = %desc.configuration,
      steps = steps.len(),
      needed,
      workers = max,
      "starting build"
    );

    // Unfinished dependencies per step.
    let mut waiting: Vec<usize> = steps
      .iter()
      .map(|s| {
        desc
          .dependencies(s.id)
          .iter()
          .filter(|d| !status[d.0].satisfies_dependents())
          .count()
      })
      .collect();

    // Lowest step ID first, so dispatch order is deterministic.
    let mut ready: BTreeSet<StepId> = steps
      .iter()
      .filter(|s| status[s.id.0] == StepStatus::Pending && waiting[s.id.0] == 0)
      .map(|s| s.id)
      .collect();
    for id in &ready {
      status[id.0] = StepStatus::Ready;
    }

    let mut input_signatures: HashMap<StepId, BTreeMap<String, String>> = HashMap::new();
    let mut failures = Vec::new();
    let mut join_set = JoinSet::new();
    let mut tasks: HashMap<task::Id, StepId> = HashMap::new();
    let mut running = 0usize;
    let mut stopping = false;
    let mut cancelled = cancel.is_cancelled();
    let mut cancel_wait = cancel.clone();

    loop {
      while !stopping && !cancelled && running < max {
        let Some(id) = ready.pop_first() else {
          break;
        };
        let step = desc.step(id);
        input_signatures.insert(id, signatures(step, provider));
        status[id.0] = StepStatus::Running;
        running += 1;

        debug!(step = %id, tool = %step.tool, "dispatching step");
        self.console.step_started(step);

        let request = CommandRequest {
          step: id,
          command: step.command.clone(),
          working_dir: desc.working_dir.clone(),
          environment: desc.environment.clone(),
          outputs: step.outputs.iter().map(|o| provider.resolve(o)).collect(),
        };
        let runner = Arc::clone(&self.runner);
        let token = cancel.clone();
        let task = join_set.spawn(async move { runner.run(request, token).await });
        tasks.insert(task.id(), id);
      }

      if running == 0 {
        break;
      }

      // Cancellation is seen before any result it caused.
      let joined = tokio::select! {
        biased;
        _ = cancel_wait.cancelled(), if !cancelled => {
          info!(running, "cancellation requested; waiting for running steps");
          cancelled = true;
          continue;
        }
        joined = join_set.join_next_with_id() => joined,
      };
      let Some(joined) = joined else {
        break;
      };
      running -= 1;

      let (id, result) = match joined {
        Ok((task, result)) => match tasks.remove(&task) {
          Some(id) => (id, result),
          None => continue,
        },
        Err(e) => {
          let Some(id) = tasks.remove(&e.id()) else {
            error!(error = %e, "untracked step task failed");
            continue;
          };
          error!(step = %id, error = %e, "step task panicked");
          (
            id,
            Err(ExecuteError::Panicked {
              cmd: desc.step(id).command.clone(),
            }),
          )
        }
      };
      let step = desc.step(id);

      let outcome = result.and_then(|output| {
        self.report(step, &output);
        if output.success() {
          Ok(())
        } else {
          Err(ExecuteError::CmdFailed {
            cmd: step.command.clone(),
            code: output.code,
          })
        }
      });

      match outcome {
        Ok(()) => {
          status[id.0] = StepStatus::Succeeded;
          for dependent in desc.dependents(id) {
            let count = &mut waiting[dependent.0];
            *count = count.saturating_sub(1);
            if *count == 0 && status[dependent.0] == StepStatus::Pending {
              status[dependent.0] = StepStatus::Ready;
              ready.insert(dependent);
            }
          }
        }
        Err(ExecuteError::Cancelled) => {
          status[id.0] = StepStatus::Skipped(SkipReason::Cancelled);
          cancelled = true;
        }
        Err(e) => {
          error!(step = %id, tool = %step.tool_name, error = %e, "step failed");
          status[id.0] = StepStatus::Failed;
          failures.push((id, e));
          if self.config.resume_on_error {
            skip_dependents(desc, id, &mut status, &mut ready);
          } else {
            stopping = true;
          }
        }
      }
      self.console.step_finished(step, status[id.0]);
    }

    let leftover = if cancelled {
      SkipReason::Cancelled
    } else {
      SkipReason::Stopped
    };
    for s in status.iter_mut() {
      match s {
        StepStatus::Pending | StepStatus::Ready => *s = StepStatus::Skipped(leftover),
        // Only an untracked task leaves a step running.
        StepStatus::Running => *s = StepStatus::Failed,
        _ => {}
      }
    }

    self.record(desc, &status, input_signatures, state, provider);
    if let Some(store) = &self.store {
      store.save(state)?;
    }

    let aggregate = if needed == 0 {
      BuildStatus::NothingToBuild
    } else if cancelled {
      BuildStatus::Cancelled
    } else if status.contains(&StepStatus::Failed) {
      BuildStatus::CompletedWithFailures
    } else {
      BuildStatus::AllSucceeded
    };

    let summary = ExecuteSummary {
      status: aggregate,
      steps: status,
      failures,
      duration: started.elapsed(),
    };

    info!(
      status = %summary.status,
      succeeded = summary.succeeded(),
      failed = summary.failed(),
      skipped = summary.skipped(),
      elapsed = ?summary.duration,
      "build finished"
    );

    Ok(summary)
  }

  fn report(&self, step: &BuildStep, output: &CommandOutput) {
    for (stream, text) in [
      (OutputStream::Stdout, &output.stdout),
      (OutputStream::Stderr, &output.stderr),
    ] {
      if text.trim().is_empty() {
        continue;
      }
      self.console.output(step, stream, text);

      if let Some(parser) = &self.parser {
        for line in text.lines() {
          if let Some(marker) = parser.parse_line(step, line).filter(ProblemMarker::is_well_formed) {
            self.console.problem(step, &marker);
          }
        }
      }
    }
  }

  /// Apply the outcome of a build to the state in one pass.
  fn record(
    &self,
    desc: &BuildDescription,
    status: &[StepStatus],
    mut input_signatures: HashMap<StepId, BTreeMap<String, String>>,
    state: &mut BuildState,
    provider: &dyn ResourceProvider,
  ) {
    let mut recorded = 0usize;
    let mut forgotten = 0usize;

    for step in desc.steps() {
      match status[step.id.0] {
        StepStatus::Succeeded => {
          let inputs = input_signatures.remove(&step.id).unwrap_or_default();
          for output in &step.outputs {
            let signature = provider.signature(output);
            if signature.is_none() {
              warn!(step = %step.id, output = %output, "step succeeded without producing output");
            }
            state.set_record(
              output.clone(),
              ResourceRecord {
                signature,
                inputs: inputs.clone(),
              },
            );
            recorded += 1;
          }
        }
        StepStatus::Failed | StepStatus::Skipped(SkipReason::DependencyFailed(_)) => {
          for output in &step.outputs {
            forgotten += usize::from(state.forget(output));
          }
        }
        _ => {}
      }
    }

    for output in &desc.stale_outputs {
      forgotten += usize::from(state.forget(output));
    }

    debug!(recorded, forgotten, "build state updated");
  }
}

/// Current signatures of a step's inputs.
fn signatures(step: &BuildStep, provider: &dyn ResourceProvider) -> BTreeMap<String, String> {
  step
    .all_inputs()
    .filter_map(|input| provider.signature(input).map(|s| (input.clone(), s)))
    .collect()
}

/// Skip every step downstream of a failed one.
fn skip_dependents(desc: &BuildDescription, failed: StepId, status: &mut [StepStatus], ready: &mut BTreeSet<StepId>) {
  let mut queue = desc.dependents(failed);
  while let Some(id) = queue.pop() {
    if status[id.0].is_terminal() || status[id.0] == StepStatus::Running {
      continue;
    }
    warn!(step = %id, failed_dep = %failed, "skipping step due to failed dependency");
    status[id.0] = StepStatus::Skipped(SkipReason::DependencyFailed(failed));
    ready.remove(&id);
    queue.extend(desc.dependents(id));
  }
}
