//! Planning and building through the CLI.

#![cfg(unix)]

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn plan_lists_steps_without_running_them() {
  let env = TestEnv::with_project(&[("src/a.c", "A\n"), ("src/b.c", "B\n")]);

  env
    .mbs_cmd()
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("Demo Compiler"))
    .stdout(predicate::str::contains("Demo Linker"))
    .stdout(predicate::str::contains("To build: 3"));
  assert!(!env.root().join("Debug").exists());

  let plan = env.json(&["plan"]);
  assert_eq!(plan["buildDir"], "Debug");
  assert_eq!(plan["steps"].as_array().unwrap().len(), 3);
}

#[test]
fn plan_of_empty_project() {
  let env = TestEnv::with_project(&[]);
  env
    .mbs_cmd()
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing to build"));
}

#[test]
fn build_then_rebuild_nothing() {
  let env = TestEnv::with_project(&[("src/a.c", "A\n"), ("src/b.c", "B\n")]);

  env
    .mbs_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Build finished"));
  assert_eq!(env.read_file("Debug/app"), "A\nB\n");

  env
    .mbs_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Everything is up to date"));

  env.write_file("src/a.c", "A2\n");
  let summary = env.json(&["build"]);
  assert_eq!(summary["status"], "allSucceeded");
  assert_eq!(summary["succeeded"], 2);
  assert_eq!(env.read_file("Debug/app"), "A2\nB\n");
}

#[test]
fn option_change_rebuilds_everything() {
  let env = TestEnv::with_project(&[("src/a.c", "A\n")]);
  env.mbs_cmd().arg("build").assert().success();

  env.mbs_cmd().args(["option", "demo.cc", "Extra", "--", "-n"]).assert().success();
  let plan = env.json(&["plan"]);
  let steps = plan["steps"].as_array().unwrap();
  assert!(steps.iter().all(|s| s["needsRebuild"] == true));

  env.mbs_cmd().arg("build").assert().success();
  assert_eq!(env.read_file("Debug/app"), "     1\tA\n");
}

#[test]
fn failed_step_fails_the_build() {
  let env = TestEnv::with_project(&[("src/a.c", "A\n"), ("src/b.c", "B\n")]);
  env
    .mbs_cmd()
    .args(["option", "demo.cc", "Extra", "-f", "src/b.c", "--", "--no-such-flag"])
    .assert()
    .success();

  env
    .mbs_cmd()
    .args(["build", "-j", "1"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Demo Compiler failed"));
  assert!(!env.root().join("Debug/app").exists());
}

#[test]
fn keep_going_builds_independent_steps() {
  let env = TestEnv::with_project(&[("src/a.c", "A\n"), ("src/b.c", "B\n")]);
  env
    .mbs_cmd()
    .args(["option", "demo.cc", "Extra", "-f", "src/b.c", "--", "--no-such-flag"])
    .assert()
    .success();

  let output = env
    .mbs_cmd()
    .args(["-o", "json", "build", "--keep-going"])
    .output()
    .unwrap();
  assert!(!output.status.success());

  let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(summary["status"], "completedWithFailures");
  assert_eq!(summary["succeeded"], 1);
  assert_eq!(summary["failed"], 1);
  assert_eq!(summary["skipped"], 1);
  assert_eq!(env.read_file("Debug/src/a.o"), "A\n");
}
