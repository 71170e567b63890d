//! End-to-end tests for the variant binary

mod common;

use assert_cmd::Command;
use common::{create_taskfile, create_taskfile_with_subdir};
use predicates::prelude::*;
use std::fs;
use std::path::Path;

const TASKFILE: &str = r#"
tasks:
  hello:
    description: Say hello
    inputs:
      - name: who
        default: world
    script: echo "hello {{.who}}"
  greet:
    inputs:
      - name: greeting
        argument-index: 0
      - name: who
        argument-index: 1
    script: echo "{{.greeting}}, {{.who}}"
  where:
    inputs:
      - name: env
    script: echo "env={{.env}}"
  broken:
    script: echo boom >&2; exit 3
  deploy:
    description: Deployment tasks
    inputs:
      - name: region
        default: us-east-1
    tasks:
      web:
        inputs:
          - name: dry-run
            type: boolean
            default: false
        script: echo "{{.region}} dry-run={{.dry-run}}"
"#;

fn variant(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("variant").unwrap();
    cmd.current_dir(dir)
        .env_remove("VARFILE")
        .env_remove("VARIANT_RUN")
        .env_remove("VARIANT_RUN_TRIM_PREFIX")
        .env_remove("RUST_LOG")
        .env_remove("VERBOSE");
    cmd
}

#[test]
fn test_runs_task_with_default() {
    let (temp_dir, _) = create_taskfile(TASKFILE);
    variant(temp_dir.path())
        .arg("hello")
        .assert()
        .success()
        .stdout(predicate::str::contains("hello world"));
}

#[test]
fn test_flag_overrides_default() {
    let (temp_dir, _) = create_taskfile(TASKFILE);
    variant(temp_dir.path())
        .args(["hello", "--who=rust"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello rust"));
}

#[test]
fn test_positional_arguments() {
    let (temp_dir, _) = create_taskfile(TASKFILE);
    variant(temp_dir.path())
        .args(["greet", "hi", "there"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hi, there"));
}

#[test]
fn test_nested_task_with_persistent_flag() {
    let (temp_dir, _) = create_taskfile(TASKFILE);
    variant(temp_dir.path())
        .args(["deploy", "--region=eu-west-1", "web", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("eu-west-1 dry-run=true"));
}

#[test]
fn test_config_file_supplies_values() {
    let (temp_dir, _) = create_taskfile(TASKFILE);
    fs::write(temp_dir.path().join("values.yaml"), "hello:\n  who: config\n").unwrap();
    variant(temp_dir.path())
        .args(["hello", "--config-file", "values.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello config"));
}

#[test]
fn test_failing_script_exits_with_error() {
    let (temp_dir, _) = create_taskfile(TASKFILE);
    variant(temp_dir.path())
        .arg("broken")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("boom"))
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("command \"variant broken\""));
}

#[test]
fn test_unknown_flag_is_usage_error() {
    let (temp_dir, _) = create_taskfile(TASKFILE);
    variant(temp_dir.path())
        .args(["hello", "--nope"])
        .assert()
        .code(2);
}

#[test]
fn test_help_lists_tasks() {
    let (temp_dir, _) = create_taskfile(TASKFILE);
    variant(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("hello"))
        .stdout(predicate::str::contains("Deployment tasks"));
}

#[test]
fn test_group_without_body_prints_help() {
    let (temp_dir, _) = create_taskfile(TASKFILE);
    variant(temp_dir.path())
        .arg("deploy")
        .assert()
        .success()
        .stdout(predicate::str::contains("web"));
}

#[test]
fn test_env_switch_is_persisted() {
    let (temp_dir, _) = create_taskfile(TASKFILE);
    variant(temp_dir.path())
        .args(["env", "switch", "dev"])
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(temp_dir.path().join(".variantenv")).unwrap().trim(),
        "dev"
    );

    variant(temp_dir.path())
        .arg("env")
        .assert()
        .success()
        .stdout(predicate::str::contains("dev"));

    variant(temp_dir.path())
        .arg("where")
        .assert()
        .success()
        .stdout(predicate::str::contains("env=dev"));
}

#[test]
fn test_varfile_selects_taskfile() {
    let (temp_dir, path) = create_taskfile(TASKFILE);
    let other = tempfile::TempDir::new().unwrap();
    variant(other.path())
        .env("VARFILE", &path)
        .arg("hello")
        .assert()
        .success()
        .stdout(predicate::str::contains("hello world"));
    drop(temp_dir);
}

#[test]
fn test_file_flag_selects_taskfile() {
    let (temp_dir, path) = create_taskfile(TASKFILE);
    let other = tempfile::TempDir::new().unwrap();
    variant(other.path())
        .arg("-f")
        .arg(&path)
        .arg("hello")
        .assert()
        .success()
        .stdout(predicate::str::contains("hello world"));
    drop(temp_dir);
}

#[test]
fn test_args_from_environment() {
    let (temp_dir, _) = create_taskfile(TASKFILE);
    variant(temp_dir.path())
        .env("VARIANT_RUN", "/bin/app hello --who='from env'")
        .env("VARIANT_RUN_TRIM_PREFIX", "/bin/app")
        .assert()
        .success()
        .stdout(predicate::str::contains("hello from env"));
}

#[test]
fn test_completion_script() {
    let (temp_dir, _) = create_taskfile(TASKFILE);
    variant(temp_dir.path())
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello"));
}

#[test]
fn test_missing_taskfile() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    variant(temp_dir.path())
        .arg("hello")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_taskfile_found_from_subdirectory() {
    let (temp_dir, _, sub_dir) = create_taskfile_with_subdir(TASKFILE);
    variant(&sub_dir)
        .arg("hello")
        .assert()
        .success()
        .stdout(predicate::str::contains("hello world"));
    drop(temp_dir);
}

#[test]
fn test_taskfile_keys_are_not_config_values() {
    let taskfile = r#"
name: variant
tasks:
  - name: greet
    options:
      - name: name
    script: echo "hello {{.name}}"
"#;
    let (temp_dir, _) = create_taskfile(taskfile);
    variant(temp_dir.path())
        .arg("greet")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("hello variant").not());

    variant(temp_dir.path())
        .args(["greet", "--name=rust"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello rust"));
}

#[test]
fn test_prefixed_lines_are_rerouted_to_stderr() {
    let taskfile = r#"
tasks:
  noisy:
    script: |
      echo "variant.stderr: oops"
      echo fine
"#;
    let (temp_dir, _) = create_taskfile(taskfile);
    variant(temp_dir.path())
        .arg("noisy")
        .assert()
        .success()
        .stdout(predicate::str::contains("fine"))
        .stdout(predicate::str::contains("oops").not())
        .stderr(predicate::str::contains("oops"))
        .stderr(predicate::str::contains("variant.stderr:").not());
}

#[test]
fn test_producer_output_is_logged_not_printed() {
    let taskfile = r#"
tasks:
  token:
    script: echo s3cr3t
  use:
    inputs:
      - name: token
    script: echo "got {{.token}}"
"#;
    let (temp_dir, _) = create_taskfile(taskfile);
    variant(temp_dir.path())
        .args(["use", "--logtostderr"])
        .assert()
        .success()
        .stdout(predicate::str::diff("got s3cr3t\n"))
        .stderr(predicate::str::contains("s3cr3t"));
}

#[test]
fn test_autodir_runs_in_parent_task_directory() {
    let taskfile = r#"
tasks:
  web:
    tasks:
      build:
        autodir: true
        script: pwd
      here:
        script: pwd
"#;
    let (temp_dir, _) = create_taskfile(taskfile);
    fs::create_dir(temp_dir.path().join("web")).unwrap();

    variant(temp_dir.path())
        .args(["web", "build"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/web"));

    variant(temp_dir.path())
        .args(["web", "here"])
        .assert()
        .success()
        .stdout(predicate::str::contains("/web").not());
}

#[test]
fn test_malformed_dotenv_fails() {
    let (temp_dir, _) = create_taskfile(TASKFILE);
    fs::write(temp_dir.path().join(".env"), "not a valid line\n").unwrap();
    variant(temp_dir.path())
        .arg("hello")
        .assert()
        .code(1)
        .stderr(predicate::str::contains(".env"));
}
