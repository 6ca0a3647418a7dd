//! `mbs build`: run a configuration's build.
//!
//! The project is locked exclusively for the duration. Ctrl-C cancels the
//! build: running tools are killed and the state of finished steps is kept.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use mbs_lib::describe::{BuildDescription, BuildFlags};
use mbs_lib::execute::{BuildStatus, CancelHandle, ExecuteConfig, ExecuteSummary, Executor, GnuErrorParser};
use mbs_lib::lock::{LockMode, ProjectLock};
use mbs_lib::model::ConfigurationView;

use super::{Context, plan_configuration, select_configuration};
use crate::output::{TerminalConsole, print_build_summary, print_json};

pub struct BuildArgs {
  pub configuration: Option<String>,
  pub rebuild: bool,
  pub jobs: i32,
  pub keep_going: bool,
  pub depfiles: bool,
  pub shell: Option<String>,
}

pub fn cmd_build(ctx: &Context, args: BuildArgs) -> Result<ExitCode> {
  let mut project = ctx.open_project()?;
  let cfg = select_configuration(&project, args.configuration.as_deref())?;

  let cfg_name = ConfigurationView::new(&project, cfg).name().to_string();
  let _lock = ProjectLock::acquire(&ctx.project_dir, LockMode::Exclusive, "mbs build", Some(&cfg_name))?;
  let flags = BuildFlags {
    rebuild: args.rebuild,
    depfiles: args.depfiles,
  };
  let mut planned = plan_configuration(&ctx.project_dir, &project, cfg, flags)?;

  let config = ExecuteConfig {
    parallelism: args.jobs,
    resume_on_error: args.keep_going,
    shell: args.shell,
  };
  let executor = Executor::with_shell(config)
    .with_console(Arc::new(TerminalConsole {
      quiet: ctx.output.is_json(),
    }))
    .with_error_parser(Arc::new(GnuErrorParser))
    .with_state_store(planned.store.clone());

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let summary = rt.block_on(async {
    let handle = CancelHandle::new();
    let token = handle.token();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        handle.cancel();
      }
    });
    executor
      .execute(&planned.description, &mut planned.state, &planned.provider, token)
      .await
  });
  let summary = summary.context("Build failed")?;

  if matches!(summary.status, BuildStatus::AllSucceeded | BuildStatus::NothingToBuild) && project.needs_rebuild(cfg) {
    project.clear_rebuild(cfg);
    ctx.save_project(&project)?;
  }

  report(ctx, &planned.description, &summary)?;
  Ok(match summary.status {
    BuildStatus::AllSucceeded | BuildStatus::NothingToBuild => ExitCode::SUCCESS,
    BuildStatus::CompletedWithFailures | BuildStatus::Cancelled => ExitCode::FAILURE,
  })
}

fn report(ctx: &Context, desc: &BuildDescription, summary: &ExecuteSummary) -> Result<()> {
  if !ctx.output.is_json() {
    print_build_summary(desc, summary);
    return Ok(());
  }

  let failures: Vec<_> = summary
    .failures
    .iter()
    .map(|(id, err)| serde_json::json!({ "step": id, "error": err.to_string() }))
    .collect();
  print_json(&serde_json::json!({
    "status": summary.status,
    "succeeded": summary.succeeded(),
    "failed": summary.failed(),
    "skipped": summary.skipped(),
    "durationMs": summary.duration.as_millis() as u64,
    "steps": summary.steps,
    "failures": failures,
  }))
}
