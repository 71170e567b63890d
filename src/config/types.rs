//! Core Taskfile types
//!
//! The canonical task tree every Taskfile dialect is normalized into, plus the
//! raw shapes of the three dialects as they appear in YAML.

use crate::error::{ConfigError, ConfigResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One node of the canonical task tree
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskDefinition {
    /// Leaf segment of the task name
    pub name: String,

    /// Help text
    pub description: String,

    /// Declared inputs, in declaration order
    pub inputs: Vec<InputConfig>,

    /// Child tasks, in declaration order
    pub children: Vec<TaskDefinition>,

    /// Single inline script (sugar for one script step)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// Runner used by the inline script
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner: Option<RunnerConfig>,

    /// Steps executed in order
    pub steps: Vec<StepDefinition>,

    /// Expose bound values to scripts as environment variables
    pub autoenv: bool,

    /// Run scripts in the directory named after the parent task
    pub autodir: bool,

    /// Attach scripts to the terminal instead of capturing their output
    pub interactive: bool,
}

/// Supported input types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    #[default]
    String,
    Integer,
    Boolean,
}

impl InputType {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "" | "string" => Some(InputType::String),
            "integer" | "int" => Some(InputType::Integer),
            "boolean" | "bool" => Some(InputType::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::String => "string",
            InputType::Integer => "integer",
            InputType::Boolean => "boolean",
        }
    }
}

/// A declared task input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    /// Possibly dotted name; also the short key of a task producing the value
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Raw type string; validated by the schema checks
    #[serde(rename = "type", default = "default_input_type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Position in argv that fills this input
    #[serde(
        rename = "argument-index",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub argument_index: Option<usize>,
}

fn default_input_type() -> String {
    "string".to_string()
}

impl InputConfig {
    pub fn new(name: impl Into<String>) -> Self {
        InputConfig {
            name: name.into(),
            kind: default_input_type(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, kind: InputType) -> Self {
        self.kind = kind.as_str().to_string();
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn input_type(&self) -> InputType {
        InputType::parse(&self.kind).unwrap_or_default()
    }
}

/// A raw step definition, preserving whichever keys identify its kind
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StepDefinition(pub Map<String, Value>);

impl StepDefinition {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Non-empty string stored under `key`
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.str("name")
    }

    pub fn bool(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Script step with the given body
    pub fn script(
        name: &str,
        script: &str,
        runner: Option<&RunnerConfig>,
    ) -> ConfigResult<Self> {
        let mut map = Map::new();
        map.insert("name".to_string(), Value::String(name.to_string()));
        map.insert("script".to_string(), Value::String(script.to_string()));
        if let Some(runner) = runner {
            let value = serde_json::to_value(runner)
                .map_err(|e| ConfigError::Invalid(format!("runner of step '{}': {}", name, e)))?;
            map.insert("runner".to_string(), value);
        }
        Ok(StepDefinition(map))
    }
}

/// Where and how a script runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Container image; empty runs the script on the host
    #[serde(default)]
    pub image: String,

    /// Shell or container command
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub entrypoint: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub envfile: String,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub volumes: Vec<String>,

    #[serde(default)]
    pub net: String,

    #[serde(default)]
    pub workdir: String,

    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

/// A directory tree shared between script runs through remote storage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Artifact {
    /// Archive name
    pub name: String,

    /// Glob of files packed into the archive
    pub path: String,

    /// Remote location template, e.g. `s3://bucket/{{ .env }}/out.tgz`
    pub via: String,
}

// Raw dialect shapes. Each denies unknown fields so that a document written for
// one dialect fails to parse as another.

/// Positional parameter of the first dialect
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterV1 {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default = "default_input_type")]
    pub kind: String,
    #[serde(default)]
    pub default: Option<Value>,
}

/// First dialect: named tasks with child lists
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDefV1 {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParameterV1>,
    #[serde(default)]
    pub options: Vec<ParameterV1>,
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
    #[serde(default)]
    pub tasks: Vec<TaskDefV1>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub runner: Option<RunnerConfig>,
    #[serde(default)]
    pub steps: Vec<serde_yaml::Value>,
    #[serde(default)]
    pub autoenv: bool,
    #[serde(default)]
    pub autodir: bool,
    #[serde(default)]
    pub interactive: bool,
}

/// Second dialect: unnamed tasks with children keyed by name
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskDefV2 {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
    #[serde(default)]
    pub tasks: IndexMap<String, TaskDefV2>,
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    pub runner: Option<RunnerConfig>,
    #[serde(default)]
    pub steps: Vec<serde_yaml::Value>,
    #[serde(default)]
    pub autoenv: bool,
    #[serde(default)]
    pub autodir: bool,
    #[serde(default)]
    pub interactive: bool,
}
