//! Taskfile discovery and parsing
//!
//! Three Taskfile dialects are accepted. Each is tried in turn and a document
//! that does not fit one falls through to the next:
//!
//! - V1: named tasks, children as a list under `tasks`, `parameters` and `options`
//! - V2: unnamed tasks, children as a map under `tasks`
//! - V3: a `tasks` map whose leaves are recognized by `script` or `steps`

use crate::config::types::{
    InputConfig, ParameterV1, RunnerConfig, StepDefinition, TaskDefV1, TaskDefV2, TaskDefinition,
};
use crate::error::{ConfigError, ConfigResult, VariantError};
use crate::utils::cast_keys_to_strings;
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default Taskfile names to search for
const TASKFILE_NAMES: &[&str] = &["variant.yaml", "variant.yml"];

/// Environment variable overriding the Taskfile path
pub const VARFILE_ENV: &str = "VARFILE";

/// Keys a V3 group node interprets as attributes rather than children
const V3_GROUP_ATTRIBUTES: &[&str] = &[
    "description",
    "inputs",
    "autoenv",
    "autodir",
    "interactive",
];

/// Find the Taskfile by searching current and parent directories
pub fn find_taskfile() -> ConfigResult<PathBuf> {
    if let Ok(path) = env::var(VARFILE_ENV) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    find_taskfile_from(env::current_dir().map_err(|e| {
        ConfigError::Invalid(format!("Failed to get current directory: {}", e))
    })?)
}

/// Find the Taskfile starting from a specific directory
pub fn find_taskfile_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        for file_name in TASKFILE_NAMES {
            let path = current_dir.join(file_name);
            searched_paths.push(path.display().to_string());

            if path.is_file() {
                return Ok(path);
            }
        }

        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// Application name derived from a Taskfile path: its file stem
pub fn app_name_for(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("variant")
        .to_string()
}

/// Parse a Taskfile from a path
pub fn parse_taskfile(path: &Path, app_name: &str) -> Result<TaskDefinition, VariantError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    parse_definition(&contents, app_name)
}

/// Parse a Taskfile document into the canonical task tree rooted at `app_name`
pub fn parse_definition(yaml: &str, app_name: &str) -> Result<TaskDefinition, VariantError> {
    let document: serde_yaml::Value = serde_yaml::from_str(yaml)?;
    let mut failures = Vec::new();

    match serde_yaml::from_value::<TaskDefV1>(document.clone()) {
        Ok(v1) => return Ok(rooted(from_v1(v1)?, app_name)),
        Err(e) => failures.push(format!("v1: {}", e)),
    }

    match serde_yaml::from_value::<TaskDefV2>(document.clone()) {
        Ok(v2) => match check_v2(&v2, app_name) {
            Ok(()) => return Ok(rooted(from_v2(app_name.to_string(), v2)?, app_name)),
            Err(reason) => failures.push(format!("v2: {}", reason)),
        },
        Err(e) => failures.push(format!("v2: {}", e)),
    }

    match from_v3(document, app_name) {
        Ok(definition) => return Ok(rooted(definition, app_name)),
        Err(Mismatch::Invalid(e)) => return Err(e.into()),
        Err(Mismatch::Shape(reason)) => failures.push(format!("v3: {}", reason)),
    }

    Err(ConfigError::UnknownFormat(failures.join("; ")).into())
}

fn rooted(mut definition: TaskDefinition, app_name: &str) -> TaskDefinition {
    definition.name = app_name.to_string();
    definition
}

/// Why a document did not load as a given dialect
enum Mismatch {
    /// The document has another dialect's shape
    Shape(String),
    /// The document has this dialect's shape but is invalid
    Invalid(ConfigError),
}

impl From<ConfigError> for Mismatch {
    fn from(e: ConfigError) -> Self {
        Mismatch::Invalid(e)
    }
}

/// Every V2 task needs a body or children
fn check_v2(task: &TaskDefV2, name: &str) -> Result<(), String> {
    let has_script = task.script.as_deref().is_some_and(|s| !s.is_empty());
    if !has_script && task.steps.is_empty() && task.tasks.is_empty() {
        return Err(format!("task '{}' has no script, steps or tasks", name));
    }
    for (child_name, child) in &task.tasks {
        check_v2(child, child_name)?;
    }
    Ok(())
}

fn from_v1(task: TaskDefV1) -> ConfigResult<TaskDefinition> {
    let mut inputs: Vec<InputConfig> = task
        .parameters
        .into_iter()
        .enumerate()
        .map(|(i, p)| parameter_input(p, Some(i)))
        .collect();
    inputs.extend(task.options.into_iter().map(|o| parameter_input(o, None)));
    inputs.extend(task.inputs);

    let children = task
        .tasks
        .into_iter()
        .map(from_v1)
        .collect::<ConfigResult<Vec<_>>>()?;

    build_node(NodeParts {
        name: task.name,
        description: task.description,
        inputs,
        children,
        script: task.script,
        runner: task.runner,
        steps: task.steps,
        autoenv: task.autoenv,
        autodir: task.autodir,
        interactive: task.interactive,
    })
}

fn parameter_input(parameter: ParameterV1, argument_index: Option<usize>) -> InputConfig {
    InputConfig {
        name: parameter.name,
        description: parameter.description,
        kind: parameter.kind,
        default: parameter.default,
        argument_index,
    }
}

fn from_v2(name: String, task: TaskDefV2) -> ConfigResult<TaskDefinition> {
    let children = task
        .tasks
        .into_iter()
        .map(|(child_name, child)| from_v2(child_name, child))
        .collect::<ConfigResult<Vec<_>>>()?;

    build_node(NodeParts {
        name,
        description: task.description,
        inputs: task.inputs,
        children,
        script: task.script,
        runner: task.runner,
        steps: task.steps,
        autoenv: task.autoenv,
        autodir: task.autodir,
        interactive: task.interactive,
    })
}

fn from_v3(document: serde_yaml::Value, app_name: &str) -> Result<TaskDefinition, Mismatch> {
    let mut root = match document {
        serde_yaml::Value::Mapping(mapping) => mapping,
        _ => return Err(Mismatch::Shape("document is not a mapping".to_string())),
    };

    let tasks = match root.remove("tasks") {
        Some(serde_yaml::Value::Mapping(tasks)) => tasks,
        Some(_) => return Err(Mismatch::Shape("'tasks' is not a mapping".to_string())),
        None => return Err(Mismatch::Shape("no 'tasks' mapping".to_string())),
    };

    let attributes: TaskDefV2 = serde_yaml::from_value(serde_yaml::Value::Mapping(root))
        .map_err(|e| Mismatch::Shape(e.to_string()))?;
    let mut definition = from_v2(app_name.to_string(), attributes)?;

    for (key, value) in tasks {
        let child_name = yaml_key(&key)?;
        definition.children.push(v3_node(child_name, value)?);
    }
    Ok(definition)
}

fn v3_node(name: String, value: serde_yaml::Value) -> Result<TaskDefinition, Mismatch> {
    let mapping = match value {
        serde_yaml::Value::Mapping(mapping) => mapping,
        _ => {
            return Err(Mismatch::Shape(format!(
                "task '{}' is not a mapping",
                name
            )))
        }
    };

    let is_leaf = mapping.contains_key("script") || mapping.contains_key("steps");
    if is_leaf {
        let leaf: TaskDefV2 = serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
            .map_err(|e| Mismatch::Shape(format!("task '{}': {}", name, e)))?;
        return Ok(from_v2(name, leaf)?);
    }

    let mut attributes = serde_yaml::Mapping::new();
    let mut children = Vec::new();
    for (key, value) in mapping {
        let key_name = yaml_key(&key)?;
        if V3_GROUP_ATTRIBUTES.contains(&key_name.as_str()) {
            attributes.insert(key, value);
        } else {
            children.push(v3_node(key_name, value)?);
        }
    }

    let group: TaskDefV2 = serde_yaml::from_value(serde_yaml::Value::Mapping(attributes))
        .map_err(|e| Mismatch::Shape(format!("task '{}': {}", name, e)))?;
    let mut definition = from_v2(name, group)?;
    definition.children = children;
    Ok(definition)
}

fn yaml_key(key: &serde_yaml::Value) -> Result<String, Mismatch> {
    key.as_str()
        .map(str::to_string)
        .ok_or_else(|| Mismatch::Shape(format!("task key {:?} is not a string", key)))
}

struct NodeParts {
    name: String,
    description: String,
    inputs: Vec<InputConfig>,
    children: Vec<TaskDefinition>,
    script: Option<String>,
    runner: Option<RunnerConfig>,
    steps: Vec<serde_yaml::Value>,
    autoenv: bool,
    autodir: bool,
    interactive: bool,
}

/// Normalize one node: enforce script/steps exclusivity and name unnamed steps
fn build_node(parts: NodeParts) -> ConfigResult<TaskDefinition> {
    let script = parts.script.filter(|s| !s.is_empty());
    if script.is_some() && !parts.steps.is_empty() {
        return Err(ConfigError::ScriptAndSteps(parts.name));
    }

    let steps = parts
        .steps
        .into_iter()
        .enumerate()
        .map(|(i, raw)| step_definition(&parts.name, i, raw))
        .collect::<ConfigResult<Vec<_>>>()?;

    Ok(TaskDefinition {
        name: parts.name,
        description: parts.description,
        inputs: parts.inputs,
        children: parts.children,
        script,
        runner: parts.runner,
        steps,
        autoenv: parts.autoenv,
        autodir: parts.autodir,
        interactive: parts.interactive,
    })
}

/// Convert a raw YAML step into a string-keyed map named `step-<n>` when unnamed
pub fn step_definition(
    task: &str,
    index: usize,
    raw: serde_yaml::Value,
) -> ConfigResult<StepDefinition> {
    let fallback_name = format!("step-{}", index + 1);
    match cast_keys_to_strings(raw)? {
        Value::Object(mut map) => {
            let named = map
                .get("name")
                .and_then(Value::as_str)
                .is_some_and(|n| !n.is_empty());
            if !named {
                map.insert("name".to_string(), Value::String(fallback_name));
            }
            Ok(StepDefinition(map))
        }
        other => Err(ConfigError::InvalidStep {
            task: task.to_string(),
            step: fallback_name,
            reason: format!("expected a mapping, got {}", other),
        }),
    }
}
