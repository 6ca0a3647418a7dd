//! Incremental builds with real processes.

#![cfg(unix)]

use mbs_lib::execute::{BuildStatus, ExecuteConfig, SkipReason, StepStatus};
use mbs_lib::project::{OptionValue, ProjectModel};
use mbs_lib::state::BuildStateStore;

use super::common::{build, cat_project, read, workspace, write};

fn config(parallelism: i32, resume_on_error: bool) -> ExecuteConfig {
  ExecuteConfig {
    parallelism,
    resume_on_error,
    shell: None,
  }
}

/// Put a flag `cat` rejects on one file's compile step.
fn break_file(project: &mut ProjectModel, path: &str) {
  set_extra(project, path, "--no-such-flag");
}

fn set_extra(project: &mut ProjectModel, path: &str, value: &str) {
  let debug = project.find_configuration("Debug").unwrap();
  let rc = project.create_resource_configuration(debug, path);
  let cc = project.find_tool(rc, "demo.cc").unwrap();
  let extra = project.find_option_by_key(cc, "demo.cc.option.extra").unwrap();
  project
    .set_value(rc, cc, extra, OptionValue::String(value.to_string()))
    .unwrap();
}

#[tokio::test]
async fn rebuilds_only_what_changed() {
  let dir = workspace(&[("src/a.c", "A\n"), ("src/b.c", "B\n")]);
  let mut project = cat_project();
  let debug = project.find_configuration("Debug").unwrap();

  let (desc, summary) = build(&mut project, debug, dir.path(), config(-1, false)).await;
  assert_eq!(summary.status, BuildStatus::AllSucceeded);
  assert_eq!(summary.succeeded(), 3);
  assert_eq!(desc.build_dir, "Debug");
  assert_eq!(read(dir.path(), "Debug/app"), "A\nB\n");

  let (_, summary) = build(&mut project, debug, dir.path(), config(-1, false)).await;
  assert_eq!(summary.status, BuildStatus::NothingToBuild);

  write(dir.path(), "src/b.c", "B2\n");
  let (desc, summary) = build(&mut project, debug, dir.path(), config(-1, false)).await;
  assert_eq!(summary.status, BuildStatus::AllSucceeded);
  assert_eq!(summary.succeeded(), 2);
  let a = desc.steps().iter().find(|s| s.inputs == ["src/a.c"]).unwrap();
  assert_eq!(summary.status_of(a.id), StepStatus::Skipped(SkipReason::UpToDate));
  assert_eq!(read(dir.path(), "Debug/app"), "A\nB2\n");
}

#[tokio::test]
async fn removed_source_is_dropped_from_the_link() {
  let dir = workspace(&[("src/a.c", "A\n"), ("src/b.c", "B\n")]);
  let mut project = cat_project();
  let debug = project.find_configuration("Debug").unwrap();
  let (desc, _) = build(&mut project, debug, dir.path(), config(2, false)).await;

  std::fs::remove_file(dir.path().join("src/b.c")).unwrap();
  let (next, summary) = build(&mut project, debug, dir.path(), config(2, false)).await;

  assert_eq!(summary.status, BuildStatus::AllSucceeded);
  assert_eq!(next.stale_outputs, vec!["Debug/src/b.o"]);
  assert_eq!(read(dir.path(), "Debug/app"), "A\n");

  let state = BuildStateStore::for_project(dir.path())
    .load(&desc.configuration)
    .unwrap();
  assert!(state.record("Debug/src/b.o").is_none());
  assert!(state.record("Debug/src/a.o").is_some());
}

#[tokio::test]
async fn resume_builds_around_a_failure() {
  let dir = workspace(&[("src/a.c", "A\n"), ("src/bad.c", "BAD\n"), ("src/c.c", "C\n")]);
  let mut project = cat_project();
  let debug = project.find_configuration("Debug").unwrap();
  break_file(&mut project, "src/bad.c");

  let (desc, summary) = build(&mut project, debug, dir.path(), config(2, true)).await;
  assert_eq!(summary.status, BuildStatus::CompletedWithFailures);
  assert_eq!(summary.succeeded(), 2);
  assert_eq!(summary.failed(), 1);

  let bad = desc.steps().iter().find(|s| s.inputs == ["src/bad.c"]).unwrap();
  let link = desc.steps().iter().find(|s| s.tool == "demo.ld").unwrap();
  assert!(bad.command.contains("--no-such-flag"), "{}", bad.command);
  assert_eq!(summary.status_of(bad.id), StepStatus::Failed);
  assert_eq!(
    summary.status_of(link.id),
    StepStatus::Skipped(SkipReason::DependencyFailed(bad.id))
  );
  assert!(!dir.path().join("Debug/app").exists());
  assert!(project.needs_rebuild(debug));

  set_extra(&mut project, "src/bad.c", "");
  let (_, summary) = build(&mut project, debug, dir.path(), config(2, true)).await;
  assert_eq!(summary.status, BuildStatus::AllSucceeded);
  assert_eq!(read(dir.path(), "Debug/app"), "A\nBAD\nC\n");
  assert!(!project.needs_rebuild(debug));
}

#[tokio::test]
async fn failure_stops_a_serial_build() {
  let dir = workspace(&[("src/a.c", "A\n"), ("src/bad.c", "BAD\n"), ("src/c.c", "C\n")]);
  let mut project = cat_project();
  let debug = project.find_configuration("Debug").unwrap();
  break_file(&mut project, "src/bad.c");

  let (desc, summary) = build(&mut project, debug, dir.path(), config(1, false)).await;
  assert_eq!(summary.status, BuildStatus::CompletedWithFailures);
  assert_eq!(summary.failed(), 1);

  let c = desc.steps().iter().find(|s| s.inputs == ["src/c.c"]).unwrap();
  assert_eq!(summary.status_of(c.id), StepStatus::Skipped(SkipReason::Stopped));
  assert!(!dir.path().join("Debug/src/c.o").exists());
}
