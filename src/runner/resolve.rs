//! Input value resolution
//!
//! For every input a task depends on, the first source yielding a value wins:
//!
//! 1. the positional argument at the input's `argument-index`
//! 2. values provided by the calling step
//! 3. config key `<caller>.<input>`
//! 4. config key `<task>.<input>`
//! 5. config key `<input>`
//! 6. the output of the task named like the input, memoized per invocation
//! 7. the declared default
//! 8. the selected environment, for an input named `env`

use crate::application::Application;
use crate::config::InputType;
use crate::error::{ResolutionError, Result};
use crate::task::{ResolvedInput, Task, TaskName};
use crate::utils::{deep_merge, get_value_at_path, scalar_to_string, set_value_at_path, split_path};
use serde_json::{Map, Value};
use tracing::debug;

/// Name of the input bound to the selected environment
const ENV_INPUT: &str = "env";

/// Computes the values bound to a task before it runs
pub struct ValueResolver<'a> {
    app: &'a Application,
}

impl<'a> ValueResolver<'a> {
    pub fn new(app: &'a Application) -> Self {
        ValueResolver { app }
    }

    /// Values of the inputs `task` depends on, keyed by dotted input name
    pub fn direct_input_values(
        &self,
        task: &Task,
        args: &[String],
        provided: &Map<String, Value>,
        callers: &[TaskName],
    ) -> Result<Value> {
        let mut values = Map::new();
        for input in &task.resolved_inputs {
            let Some(raw) = self.input_value(task, input, args, provided, callers)? else {
                debug!(task = %task.name, input = input.name(), "input left unset");
                continue;
            };
            let value = coerce(input, raw)?;
            set_value_at_path(&mut values, &split_path(input.name()), value)?;
        }
        Ok(Value::Object(values))
    }

    /// Direct values of `task` merged over those of each of its ancestors
    pub fn inherited_input_values(
        &self,
        task: &Task,
        args: &[String],
        provided: &Map<String, Value>,
        callers: &[TaskName],
    ) -> Result<Value> {
        let mut values = self.direct_input_values(task, args, provided, callers)?;
        let mut name = task.name.clone();
        while !name.is_root() {
            name = name.parent()?;
            let Some(ancestor) = self.app.registry.find_task(&name) else {
                continue;
            };
            let mut inherited =
                self.direct_input_values(ancestor, &[], &Map::new(), callers)?;
            deep_merge(&mut inherited, values);
            values = inherited;
        }
        Ok(values)
    }

    fn input_value(
        &self,
        task: &Task,
        input: &ResolvedInput,
        args: &[String],
        provided: &Map<String, Value>,
        callers: &[TaskName],
    ) -> Result<Option<Value>> {
        let short = input.short_name();

        if input.task_key == task.name {
            if let Some(arg) = input.config.argument_index.and_then(|i| args.get(i)) {
                debug!(input = input.name(), "from positional argument");
                return Ok(Some(Value::String(arg.clone())));
            }
        }

        if let Some(value) = provided_value(provided, input.name())? {
            debug!(input = input.name(), "from provided arguments");
            return Ok(Some(value));
        }

        if let Some(caller) = callers.last() {
            if let Some(value) = self.config_value(&[caller.short().as_str(), short.as_str()])? {
                return Ok(Some(value));
            }
        }

        let task_short = task.name.short();
        if !short.ends_with(&task_short) {
            if let Some(value) = self.config_value(&[task_short.as_str(), short.as_str()])? {
                return Ok(Some(value));
            }
        }

        if let Some(value) = self.config_value(&[short.as_str()])? {
            return Ok(Some(value));
        }

        if let Some(value) = self.produced_value(task, input, callers)? {
            return Ok(Some(value));
        }

        if let Some(default) = input.config.default.clone().filter(|v| !v.is_null()) {
            return Ok(Some(default));
        }

        if input.name() == ENV_INPUT {
            let env = self.app.environment().unwrap_or_default();
            return Ok(Some(Value::String(env.to_string())));
        }

        Ok(None)
    }

    /// Look up a config key joined from non-empty `parts`
    fn config_value(&self, parts: &[&str]) -> Result<Option<Value>> {
        let key = parts
            .iter()
            .filter(|p| !p.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(".");
        let value = self.app.settings.get(&key)?;
        if value.is_some() {
            debug!(key = %key, "from config");
        }
        Ok(value)
    }

    /// Output of the task named like `input`, running it at most once per invocation
    fn produced_value(
        &self,
        task: &Task,
        input: &ResolvedInput,
        callers: &[TaskName],
    ) -> Result<Option<Value>> {
        if input.full_name == task.name {
            return Ok(None);
        }
        let producer = match self.app.registry.find_task(&input.full_name) {
            Some(producer) if producer.is_runnable() => producer,
            _ => return Ok(None),
        };

        let path = split_path(input.name());
        if let Some(cached) = self.app.cached_output(&path)? {
            debug!(input = input.name(), "from cached task output");
            return Ok(Some(cached));
        }

        let mut chain = callers.to_vec();
        chain.push(task.name.clone());
        debug!(input = input.name(), producer = %producer.name, "running producer task");
        let output = self
            .app
            .run_task_for_key(&producer.name, &[], &Map::new(), &chain, true)
            .map_err(|e| ResolutionError::Producer {
                input: input.name().to_string(),
                source: Box::new(e),
            })?;

        let value = Value::String(output);
        self.app.cache_output(&path, value.clone())?;
        Ok(Some(value))
    }
}

/// A provided value, looked up by full dotted key first and then by path
fn provided_value(provided: &Map<String, Value>, name: &str) -> Result<Option<Value>> {
    if let Some(value) = provided.get(name) {
        return Ok(Some(value.clone()).filter(|v| !v.is_null()));
    }
    let path = split_path(name);
    let Some((first, rest)) = path.split_first() else {
        return Ok(None);
    };
    match provided.get(*first) {
        Some(value) => Ok(get_value_at_path(value, rest)?
            .filter(|v| !v.is_null())
            .cloned()),
        None => Ok(None),
    }
}

/// Convert `value` to the declared type of `input`
fn coerce(input: &ResolvedInput, value: Value) -> std::result::Result<Value, ResolutionError> {
    let kind = input.config.input_type();
    let coerced = match (kind, &value) {
        (InputType::String, Value::String(_)) => Some(value.clone()),
        (InputType::String, other) => scalar_to_string(other).map(Value::String),
        (InputType::Integer, Value::Number(n)) => n.as_i64().map(Value::from),
        (InputType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
        (InputType::Boolean, Value::Bool(b)) => Some(Value::Bool(*b)),
        (InputType::Boolean, Value::String(s)) => parse_bool(s.trim()).map(Value::Bool),
        _ => None,
    };
    coerced.ok_or_else(|| ResolutionError::InvalidValue {
        input: input.name().to_string(),
        kind: kind.as_str().to_string(),
        value: scalar_to_string(&value).unwrap_or_else(|| value.to_string()),
    })
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputConfig;
    use serde_json::json;

    fn resolved(config: InputConfig) -> ResolvedInput {
        ResolvedInput {
            full_name: TaskName::parse(&format!("app.{}", config.name)),
            task_key: TaskName::parse("app"),
            config,
        }
    }

    #[test]
    fn test_coerce() {
        let count = resolved(InputConfig::new("count").with_type(InputType::Integer));
        assert_eq!(coerce(&count, json!("42")).unwrap(), json!(42));
        assert!(matches!(
            coerce(&count, json!("many")),
            Err(ResolutionError::InvalidValue { .. })
        ));

        let flag = resolved(InputConfig::new("flag").with_type(InputType::Boolean));
        assert_eq!(coerce(&flag, json!("true")).unwrap(), json!(true));
        assert_eq!(coerce(&flag, json!("F")).unwrap(), json!(false));

        let name = resolved(InputConfig::new("name"));
        assert_eq!(coerce(&name, json!(3)).unwrap(), json!("3"));
        assert!(coerce(&name, json!({"a": 1})).is_err());
    }

    #[test]
    fn test_provided_value() {
        let mut provided = Map::new();
        provided.insert("aws.region".to_string(), json!("flat"));
        provided.insert("gcp".to_string(), json!({"zone": "nested"}));
        provided.insert("empty".to_string(), Value::Null);

        assert_eq!(provided_value(&provided, "aws.region").unwrap(), Some(json!("flat")));
        assert_eq!(provided_value(&provided, "gcp.zone").unwrap(), Some(json!("nested")));
        assert_eq!(provided_value(&provided, "empty").unwrap(), None);
        assert_eq!(provided_value(&provided, "missing").unwrap(), None);
    }
}
