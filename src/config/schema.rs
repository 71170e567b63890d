//! Task tree validation
//!
//! Structural checks run once after loading, plus the JSON schema synthesized
//! from a task's inputs that bound values are validated against before the
//! task's steps run.

use crate::config::types::{InputConfig, InputType, TaskDefinition};
use crate::error::{ConfigError, ConfigResult, ValidationError};
use crate::utils::split_path;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_-]*$").expect("valid name regex"));

/// Validate a complete task tree
pub fn validate_definition(root: &TaskDefinition) -> ConfigResult<()> {
    validate_task(&[], root)
}

/// Validate a task and its descendants
fn validate_task(parents: &[&str], task: &TaskDefinition) -> ConfigResult<()> {
    let mut path: Vec<&str> = parents.to_vec();
    path.push(&task.name);
    let display = path.join(".");

    if !NAME_RE.is_match(&task.name) {
        return Err(ConfigError::InvalidName(display));
    }

    if task.script.is_some() && !task.steps.is_empty() {
        return Err(ConfigError::ScriptAndSteps(display));
    }

    let mut input_names = HashSet::new();
    for input in &task.inputs {
        validate_input(&display, input)?;
        if !input_names.insert(input.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "input '{}' is declared twice in task '{}'",
                input.name, display
            )));
        }
    }

    let mut child_names = HashSet::new();
    for child in &task.children {
        if !child_names.insert(child.name.as_str()) {
            return Err(ConfigError::DuplicateTask(format!("{}.{}", display, child.name)));
        }
        validate_task(&path, child)?;
    }

    Ok(())
}

fn validate_input(task: &str, input: &InputConfig) -> ConfigResult<()> {
    let segments = split_path(&input.name);
    if segments.is_empty() || segments.iter().any(|s| !NAME_RE.is_match(s)) {
        return Err(ConfigError::InvalidName(format!("{}: input '{}'", task, input.name)));
    }
    if InputType::parse(&input.kind).is_none() {
        return Err(ConfigError::InvalidInputType {
            task: task.to_string(),
            input: input.name.clone(),
            kind: input.kind.clone(),
        });
    }
    Ok(())
}

/// Synthesize the JSON schema bound values of a task must satisfy.
///
/// String inputs without a default are required. Dotted input names produce
/// nested object schemas.
pub fn input_schema(inputs: &[InputConfig]) -> Value {
    let mut root = SchemaNode::default();
    for input in inputs {
        let segments = split_path(&input.name);
        let Some((leaf, parents)) = segments.split_last() else {
            continue;
        };
        let mut node = &mut root;
        for segment in parents {
            node = node.children.entry(segment.to_string()).or_default();
        }
        let kind = input.input_type();
        if input.default.is_none() && kind == InputType::String {
            node.required.push(leaf.to_string());
        }
        node.leaves.insert(leaf.to_string(), json!({ "type": kind.as_str() }));
    }
    root.to_schema()
}

#[derive(Default)]
struct SchemaNode {
    leaves: Map<String, Value>,
    children: indexmap::IndexMap<String, SchemaNode>,
    required: Vec<String>,
}

impl SchemaNode {
    fn to_schema(&self) -> Value {
        let mut properties = self.leaves.clone();
        for (name, child) in &self.children {
            properties.insert(name.clone(), child.to_schema());
        }
        let mut required = self.required.clone();
        required.extend(self.children.keys().filter(|k| self.children[*k].has_required()).cloned());

        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), json!(required));
        }
        Value::Object(schema)
    }

    fn has_required(&self) -> bool {
        !self.required.is_empty() || self.children.values().any(SchemaNode::has_required)
    }
}

/// Validate bound values against the schema of `inputs`
pub fn validate_values(
    task: &str,
    inputs: &[InputConfig],
    values: &Value,
) -> Result<(), ValidationError> {
    let schema = input_schema(inputs);
    let validator = jsonschema::validator_for(&schema).map_err(|e| ValidationError::Schema {
        task: task.to_string(),
        error: e.to_string(),
    })?;

    let errors: Vec<String> = validator.iter_errors(values).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Values {
            task: task.to_string(),
            details: errors.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_definition;

    fn task(name: &str) -> TaskDefinition {
        TaskDefinition {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_valid_tree() {
        let root = parse_definition(
            "tasks:\n  build:\n    inputs:\n      - name: target\n    script: make {{ .target }}\n",
            "app",
        )
        .unwrap();
        assert!(validate_definition(&root).is_ok());
    }

    #[test]
    fn test_duplicate_children() {
        let mut root = task("app");
        root.children.push(task("dup"));
        root.children.push(task("dup"));
        assert!(matches!(
            validate_definition(&root),
            Err(ConfigError::DuplicateTask(_))
        ));
    }

    #[test]
    fn test_invalid_input_type() {
        let mut root = task("app");
        let mut input = InputConfig::new("count");
        input.kind = "float".to_string();
        root.inputs.push(input);
        assert!(matches!(
            validate_definition(&root),
            Err(ConfigError::InvalidInputType { .. })
        ));
    }

    #[test]
    fn test_recursive_steps_are_left_to_run_time() {
        let yaml = r#"
tasks:
  a:
    steps:
      - task: b
  b:
    steps:
      - or:
          - script: "false"
          - task: a
"#;
        let root = parse_definition(yaml, "app").unwrap();
        assert!(validate_definition(&root).is_ok());
    }

    #[test]
    fn test_input_schema_requires_strings_without_default() {
        let inputs = vec![
            InputConfig::new("name"),
            InputConfig::new("greeting").with_default(json!("hi")),
            InputConfig::new("count").with_type(InputType::Integer),
            InputConfig::new("aws.region"),
        ];
        let schema = input_schema(&inputs);
        assert_eq!(schema["required"], json!(["name", "aws"]));
        assert_eq!(schema["properties"]["count"], json!({"type": "integer"}));
        assert_eq!(
            schema["properties"]["aws"]["properties"]["region"],
            json!({"type": "string"})
        );
        assert_eq!(schema["properties"]["aws"]["required"], json!(["region"]));
    }

    #[test]
    fn test_validate_values() {
        let inputs = vec![
            InputConfig::new("name"),
            InputConfig::new("count").with_type(InputType::Integer),
        ];
        assert!(validate_values("t", &inputs, &json!({"name": "x", "count": 3})).is_ok());
        assert!(validate_values("t", &inputs, &json!({"count": 3})).is_err());
        assert!(validate_values("t", &inputs, &json!({"name": "x", "count": "3"})).is_err());
    }
}
