//! Creating projects and editing their options.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn list_hides_abstract_types_unless_asked() {
  let env = TestEnv::empty();

  env
    .mbs_cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("demo.exe - Demo Executable"))
    .stdout(predicate::str::contains("demo.base").not());

  let listed = env.json(&["list", "--all"]);
  let base = listed
    .as_array()
    .unwrap()
    .iter()
    .find(|o| o["id"] == "demo.base")
    .unwrap();
  assert_eq!(base["abstract"], true);

  let exe = env.json(&["list"]);
  assert_eq!(exe[0]["superclass"], "demo.base");
}

#[test]
fn list_tools() {
  let env = TestEnv::empty();
  env
    .mbs_cmd()
    .args(["list", "tool"])
    .assert()
    .success()
    .stdout(predicate::str::contains("demo.cc - Demo Compiler"))
    .stdout(predicate::str::contains("demo.ld - Demo Linker"));
}

#[test]
fn new_writes_project_file() {
  let env = TestEnv::empty();

  let created = env.json(&["new", "demo.exe", "--name", "app", "--nature", "c"]);
  assert_eq!(created["name"], "app");
  assert_eq!(created["projectType"], "demo.exe");
  assert_eq!(created["configurations"], serde_json::json!(["Debug"]));
  assert!(env.root().join(".mbsproject.json").exists());
}

#[test]
fn new_refuses_to_overwrite() {
  let env = TestEnv::with_project(&[]);
  env
    .mbs_cmd()
    .args(["new", "demo.exe"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("already exists"));
}

#[test]
fn new_rejects_unknown_nature() {
  let env = TestEnv::empty();
  env
    .mbs_cmd()
    .args(["new", "demo.exe", "--nature", "fortran"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Unknown nature"));
}

#[test]
fn option_set_and_get() {
  let env = TestEnv::with_project(&[]);

  env
    .mbs_cmd()
    .args(["option", "demo.cc", "Extra", "--", "-n"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Extra = -n"));

  env
    .mbs_cmd()
    .args(["option", "demo.cc", "Extra"])
    .assert()
    .success()
    .stdout(predicate::str::diff("-n\n"));

  let options = env.json(&["option", "Demo Compiler"]);
  assert_eq!(options[0]["name"], "Extra");
  assert_eq!(options[0]["valueType"], "string");
  assert_eq!(options[0]["value"]["value"], "-n");
}

#[test]
fn file_options_fall_back_to_configuration() {
  let env = TestEnv::with_project(&[]);

  env.mbs_cmd().args(["option", "demo.cc", "Extra", "--", "-n"]).assert().success();
  env
    .mbs_cmd()
    .args(["option", "demo.cc", "Extra", "-f", "src/b.c", "--", "-s"])
    .assert()
    .success();

  let for_file = env.json(&["option", "demo.cc", "Extra", "-f", "src/b.c"]);
  assert_eq!(for_file["value"], "-s");
  let for_other = env.json(&["option", "demo.cc", "Extra", "-f", "src/a.c"]);
  assert_eq!(for_other["value"], "-n");
}

#[test]
fn option_unknown_names_fail() {
  let env = TestEnv::with_project(&[]);

  env
    .mbs_cmd()
    .args(["option", "demo.nope"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Unknown tool"));
  env
    .mbs_cmd()
    .args(["option", "demo.cc", "Missing"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Unknown option"));
  env
    .mbs_cmd()
    .args(["option", "demo.cc", "-c", "Release"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Unknown configuration"));
}
