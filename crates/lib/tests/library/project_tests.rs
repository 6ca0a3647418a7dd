//! Manifests on disk through to a saved and reloaded project.

use std::collections::BTreeSet;
use std::sync::Arc;

use mbs_lib::consts::PROJECT_FILE_NAME;
use mbs_lib::manifest::load_manifest_dirs;
use mbs_lib::model::{ModelDiagnostic, SharedRegistry};
use mbs_lib::project::{DefaultUpgrader, Nature, OptionValue, ProjectModel};

use super::common::{cat_registry, workspace};

const MANIFEST: &str = r#"[
  {
    "kind": "projectType",
    "attributes": { "id": "json.exe", "name": "Executable" },
    "children": [
      {
        "kind": "configuration",
        "attributes": { "id": "json.exe.release", "name": "Release", "artifactExtension": "bin" },
        "children": [
          {
            "kind": "toolChain",
            "attributes": { "id": "json.toolchain", "targetTool": "json.ld" },
            "children": [
              {
                "kind": "tool",
                "attributes": { "id": "json.ld", "name": "Linker", "command": "ld" },
                "children": [
                  { "kind": "option", "attributes": { "id": "json.ld.strip", "valueType": "boolean", "command": "-s" } },
                  { "kind": "inputType", "attributes": { "id": "json.ld.in", "sources": "o", "multipleOfType": "true" } },
                  { "kind": "outputType", "attributes": { "id": "json.ld.out", "primaryOutput": "true" } }
                ]
              }
            ]
          }
        ]
      }
    ]
  }
]"#;

const DUPLICATE: &str = r#"[
  { "kind": "projectType", "attributes": { "id": "json.exe", "name": "Shadowed" } }
]"#;

#[test]
fn manifests_load_once_and_keep_the_first_duplicate() {
  let dir = workspace(&[("a/tools.json", MANIFEST), ("b/dup.json", DUPLICATE), ("b/notes.txt", "ignored")]);
  let dirs = vec![dir.path().join("a"), dir.path().join("b"), dir.path().join("missing")];

  let shared = SharedRegistry::new();
  let registry = shared.get_or_load(|| load_manifest_dirs(&dirs).unwrap());
  let again = shared.get_or_load(|| panic!("loaded twice"));
  assert!(Arc::ptr_eq(&registry, &again));

  assert_eq!(registry.diagnostics().len(), 1);
  assert!(matches!(&registry.diagnostics()[0], ModelDiagnostic::DuplicateId { id, .. } if id == "json.exe"));

  let project = ProjectModel::create(registry, "json.exe", "tool", BTreeSet::new()).unwrap();
  assert!(project.find_configuration("Release").is_some());
}

#[test]
fn option_values_survive_save_and_load() {
  let dir = workspace(&[]);
  let path = dir.path().join(PROJECT_FILE_NAME);

  let mut project = ProjectModel::create(cat_registry(), "demo.exe", "app", BTreeSet::from([Nature::C])).unwrap();
  let debug = project.find_configuration("Debug").unwrap();
  let cc = project.find_tool(debug, "demo.cc").unwrap();
  let extra = project.find_option_by_key(cc, "Extra").unwrap();
  project
    .set_value(debug, cc, extra, OptionValue::String("-n".to_string()))
    .unwrap();
  project.save(&path).unwrap();

  let loaded = ProjectModel::load(cat_registry(), &path, &DefaultUpgrader).unwrap();
  let debug = loaded.find_configuration("Debug").unwrap();
  let cc = loaded.find_tool(debug, "demo.cc").unwrap();
  let extra = loaded.find_option_by_key(cc, "Extra").unwrap();

  assert_eq!(loaded.name(), "app");
  assert_eq!(loaded.natures(), &BTreeSet::from([Nature::C]));
  assert_eq!(
    loaded.get_value(debug, cc, extra).unwrap(),
    OptionValue::String("-n".to_string())
  );
  assert!(loaded.needs_rebuild(debug));
}
