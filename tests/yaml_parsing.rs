//! Integration tests for Taskfile loading

mod common;

use common::{create_taskfile, create_taskfile_with_subdir};
use variant::config::{
    app_name_for, find_taskfile_from, parse_definition, parse_taskfile, Settings,
};
use variant::error::{ConfigError, VariantError};
use variant::task::TaskName;
use variant::Application;

const V1: &str = r#"
name: app
tasks:
  - name: foo
    description: Foo tasks
    tasks:
      - name: bar
        inputs:
          - name: who
            default: world
        script: echo hello {{.who}}
"#;

const V2: &str = r#"
tasks:
  foo:
    description: Foo tasks
    tasks:
      bar:
        inputs:
          - name: who
            default: world
        script: echo hello {{.who}}
"#;

const V3: &str = r#"
tasks:
  foo:
    description: Foo tasks
    bar:
      inputs:
        - name: who
          default: world
      script: echo hello {{.who}}
"#;

#[test]
fn test_dialects_load_the_same_tree() {
    let v1 = parse_definition(V1, "app").unwrap();
    let v2 = parse_definition(V2, "app").unwrap();
    let v3 = parse_definition(V3, "app").unwrap();

    assert_eq!(v1, v2);
    assert_eq!(v2, v3);

    let bar = &v3.children[0].children[0];
    assert_eq!(bar.name, "bar");
    assert_eq!(bar.inputs[0].name, "who");
    assert_eq!(bar.script.as_deref(), Some("echo hello {{.who}}"));
}

#[test]
fn test_minimal_nested_tree() {
    let root = parse_definition("tasks:\n  foo:\n    bar:\n      script: foobar\n", "app").unwrap();
    assert_eq!(root.children.len(), 1);
    assert_eq!(root.children[0].name, "foo");
    assert_eq!(root.children[0].children.len(), 1);
    assert_eq!(root.children[0].children[0].name, "bar");
    assert_eq!(root.children[0].children[0].script.as_deref(), Some("foobar"));
}

#[test]
fn test_script_and_steps_are_exclusive() {
    for yaml in [
        "tasks:\n  both:\n    script: echo a\n    steps:\n      - script: echo b\n",
        "name: app\ntasks:\n  - name: both\n    script: echo a\n    steps:\n      - script: echo b\n",
    ] {
        let result = parse_definition(yaml, "app");
        assert!(
            matches!(result, Err(VariantError::Config(ConfigError::ScriptAndSteps(_)))),
            "loaded {:?}",
            yaml
        );
    }
}

#[test]
fn test_unknown_step_kind_fails_initialization() {
    let yaml = r#"
tasks:
  broken:
    steps:
      - bogus: true
"#;
    let result = Application::from_yaml("app", yaml, Settings::new("app"));
    assert!(matches!(
        result,
        Err(VariantError::Config(ConfigError::InvalidStep { .. }))
    ));
}

#[test]
fn test_registry_holds_every_node() {
    let app = Application::from_yaml("app", V3, Settings::new("app")).unwrap();
    let mut keys = app.registry.all_task_keys();
    keys.sort();
    assert_eq!(keys, vec!["", "foo", "foo.bar"]);

    let bar = app
        .registry
        .find_task(&TaskName::parse("app.foo.bar"))
        .unwrap();
    assert!(bar.is_runnable());
    assert_eq!(bar.resolved_inputs.len(), 1);
}

#[test]
fn test_parse_taskfile_from_disk() {
    let (_temp_dir, path) = create_taskfile(V2);
    assert_eq!(app_name_for(&path), "variant");

    let root = parse_taskfile(&path, "variant").unwrap();
    assert_eq!(root.name, "variant");
    assert_eq!(root.children[0].description, "Foo tasks");
}

#[test]
fn test_find_taskfile_from_subdirectory() {
    let (_temp_dir, path, sub_dir) = create_taskfile_with_subdir(V3);
    let found = find_taskfile_from(sub_dir).unwrap();
    assert_eq!(found.canonicalize().unwrap(), path.canonicalize().unwrap());
}
