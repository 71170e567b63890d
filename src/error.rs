//! Error types for Variant

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Variant operations
pub type Result<T> = std::result::Result<T, VariantError>;

/// Main error type for Variant
#[derive(Error, Debug)]
pub enum VariantError {
    /// Taskfile loading and task tree initialization errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Input value resolution errors
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Bound values rejected by the input schema
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Step execution errors
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Template parse and render errors
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Error annotated with the task that raised it
    #[error("task {key}: {source}")]
    Task {
        key: String,
        #[source]
        source: Box<VariantError>,
    },

    /// Error bubbling out of a top-level command invocation
    #[error("command \"{}\": {source}", .path.replace('.', " "))]
    Command {
        path: String,
        #[source]
        source: Box<VariantError>,
    },

    /// Error returned by an inline function task
    #[error(transparent)]
    Function(#[from] anyhow::Error),

    /// Command line usage errors (rendered and exited by clap)
    #[error("{0}")]
    Usage(#[from] clap::Error),

    /// Assertion violations inside the engine
    #[error("Internal error: unexpected {0}")]
    Internal(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VariantError {
    /// Wrap this error with the key of the task it escaped from
    pub fn in_task(self, key: impl Into<String>) -> Self {
        VariantError::Task {
            key: key.into(),
            source: Box::new(self),
        }
    }

    /// The output payload of a failed script, if this error carries one
    pub fn output(&self) -> Option<&str> {
        match self {
            VariantError::Execution(ExecutionError::ScriptFailed { output, .. }) => {
                Some(output.as_str())
            }
            VariantError::Task { source, .. }
            | VariantError::Command { source, .. }
            | VariantError::Resolution(ResolutionError::Producer { source, .. }) => {
                source.output()
            }
            _ => None,
        }
    }

    /// The innermost error of an annotation chain
    pub fn root_cause(&self) -> &VariantError {
        match self {
            VariantError::Task { source, .. }
            | VariantError::Command { source, .. }
            | VariantError::Resolution(ResolutionError::Producer { source, .. }) => {
                source.root_cause()
            }
            other => other,
        }
    }
}

/// Taskfile loading and task tree initialization errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find Taskfile (searched: {0})")]
    NotFound(String),

    #[error("Failed to read '{path}': {error}")]
    Read { path: PathBuf, error: String },

    #[error("Taskfile matches no known format: {0}")]
    UnknownFormat(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Task '{0}' defines both 'script' and 'steps'")]
    ScriptAndSteps(String),

    #[error("Task '{0}' is defined more than once")]
    DuplicateTask(String),

    #[error("Invalid name '{0}'")]
    InvalidName(String),

    #[error("Input '{input}' of task '{task}' has unsupported type '{kind}'")]
    InvalidInputType {
        task: String,
        input: String,
        kind: String,
    },

    #[error("Step '{step}' of task '{task}': {reason}")]
    InvalidStep {
        task: String,
        step: String,
        reason: String,
    },

    #[error("Task name '{0}' has no parent")]
    NoParent(String),
}

/// Input value resolution errors
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Task '{0}' is not defined")]
    TaskNotFound(String),

    #[error("Circular task invocation detected: {0}")]
    Cycle(String),

    #[error("Input '{input}' has invalid {kind} value '{value}'")]
    InvalidValue {
        input: String,
        kind: String,
        value: String,
    },

    #[error("Failed to produce input '{input}': {source}")]
    Producer {
        input: String,
        #[source]
        source: Box<VariantError>,
    },

    #[error("Path '{path}' passes through a non-map value")]
    NotAMap { path: String },
}

/// Bound values rejected by the synthesized input schema
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input schema for task '{task}': {error}")]
    Schema { task: String, error: String },

    #[error("Inputs of task '{task}' are invalid: {details}")]
    Values { task: String, details: String },
}

/// Step execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Script exited with code {code:?}: {output}")]
    ScriptFailed { code: Option<i32>, output: String },

    #[error("Failed to spawn '{program}': {error}")]
    Spawn { program: String, error: String },

    #[error("All {0} alternatives of 'or' failed")]
    NoAlternatives(usize),

    #[error("Environment error: {0}")]
    Environment(String),
}

/// Template errors
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("{name}: invalid template syntax: {reason}")]
    InvalidSyntax { name: String, reason: String },

    #[error("{name}: map has no entry for key \"{key}\"")]
    UndefinedVariable { name: String, key: String },

    #[error("{name}: function \"{function}\" is not defined")]
    UnknownFunction { name: String, function: String },

    #[error("{name}: error calling {function}: {reason}")]
    FunctionFailed {
        name: String,
        function: String,
        reason: String,
    },
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for template operations
pub type TemplateResult<T> = std::result::Result<T, TemplateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_walks_task_chain() {
        let err = VariantError::from(ExecutionError::ScriptFailed {
            code: Some(3),
            output: "boom".to_string(),
        })
        .in_task("inner")
        .in_task("outer");

        assert_eq!(err.output(), Some("boom"));
        assert!(matches!(
            err.root_cause(),
            VariantError::Execution(ExecutionError::ScriptFailed { code: Some(3), .. })
        ));
    }

    #[test]
    fn test_command_error_uses_spaces() {
        let err = VariantError::Command {
            path: "deploy.app".to_string(),
            source: Box::new(VariantError::Internal("value".to_string())),
        };
        assert!(err.to_string().starts_with("command \"deploy app\""));
    }
}
