//! Execution context for task running
//!
//! A context is created per task invocation and extended per step. It carries
//! the values bound to the task, the chain of tasks that led to it and whether
//! the invocation produces another task's input.

use crate::application::Application;
use crate::error::{Result, TemplateResult};
use crate::runner::template;
use crate::task::{Task, TaskName};
use crate::utils::{deep_merge, get_string_at_path, split_path};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Per-invocation state handed to every step
#[derive(Clone)]
pub struct ExecutionContext<'a> {
    app: &'a Application,
    task: &'a Task,

    /// Values bound to the task, extended with each named step's output
    values: Value,

    /// Tasks that led to this invocation, outermost first
    callers: Vec<TaskName>,

    /// Set when the task runs to produce another task's input
    as_input: bool,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        app: &'a Application,
        task: &'a Task,
        values: Value,
        callers: Vec<TaskName>,
        as_input: bool,
    ) -> Self {
        ExecutionContext {
            app,
            task,
            values,
            callers,
            as_input,
        }
    }

    pub fn app(&self) -> &'a Application {
        self.app
    }

    pub fn task(&self) -> &'a Task {
        self.task
    }

    /// Name of the running task
    pub fn key(&self) -> &TaskName {
        &self.task.name
    }

    /// Callers of the running task, innermost first
    pub fn caller(&self) -> Vec<TaskName> {
        self.callers.iter().rev().cloned().collect()
    }

    /// Bound value tree
    pub fn vars(&self) -> &Value {
        &self.values
    }

    /// Bound value at a dotted path, rendered as a string
    pub fn string(&self, key: &str) -> Option<String> {
        get_string_at_path(&self.values, &split_path(key))
            .ok()
            .flatten()
    }

    pub fn as_input(&self) -> bool {
        self.as_input
    }

    pub fn autoenv(&self) -> bool {
        self.task.definition.autoenv
    }

    pub fn autodir(&self) -> bool {
        self.task.definition.autodir
    }

    pub fn interactive(&self) -> bool {
        self.task.definition.interactive
    }

    /// Render `expr` against the bound values
    pub fn render(&self, expr: &str, name: &str) -> TemplateResult<String> {
        template::render(name, expr, &self.values)
    }

    /// Name reported in template errors of `step`
    pub fn template_name(&self, step: &str) -> String {
        format!(
            "{}.definition.yaml: {}.{}.script",
            self.app.name,
            step,
            self.task.name.short()
        )
    }

    /// Flatten the bound values into environment variables.
    ///
    /// Keys are uppercased with `-` and `.` replaced by `_`; nested maps join
    /// their keys with `_` and sequences are enumerated by index.
    pub fn generate_autoenv(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        flatten_env(&self.values, None, &mut env);
        env
    }

    /// Run another task from this one, passing `provided` as its inputs
    pub fn run_another_task(
        &self,
        key: &str,
        args: &[String],
        provided: &Map<String, Value>,
    ) -> Result<String> {
        let name = self.app.namer.from_short(key);
        let mut callers = self.callers.clone();
        callers.push(self.task.name.clone());
        self.app
            .run_task_for_key(&name, args, provided, &callers, self.as_input)
    }

    /// A copy of this context with `values` merged over the bound values
    pub fn with_additional_values(&self, values: Map<String, Value>) -> Self {
        let mut extended = self.clone();
        deep_merge(&mut extended.values, Value::Object(values));
        extended
    }
}

fn env_name(key: &str) -> String {
    key.replace(['-', '.'], "_").to_uppercase()
}

fn flatten_env(value: &Value, prefix: Option<&str>, env: &mut BTreeMap<String, String>) {
    let join = |key: &str| match prefix {
        Some(prefix) => format!("{}_{}", prefix, env_name(key)),
        None => env_name(key),
    };

    match value {
        Value::Object(map) => {
            for (key, value) in map {
                flatten_env(value, Some(join(key).as_str()), env);
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_env(item, Some(join(&index.to_string()).as_str()), env);
            }
        }
        scalar => {
            if let Some(prefix) = prefix {
                let rendered = match scalar {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                env.insert(prefix.to_string(), rendered);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_env() {
        let values = json!({
            "aws": {"region": "us-east-1", "profile-name": "dev"},
            "count": 3,
            "dry.run": true,
            "tags": ["a", "b"],
            "none": null
        });
        let mut env = BTreeMap::new();
        flatten_env(&values, None, &mut env);

        let expected: BTreeMap<String, String> = [
            ("AWS_PROFILE_NAME", "dev"),
            ("AWS_REGION", "us-east-1"),
            ("COUNT", "3"),
            ("DRY_RUN", "true"),
            ("NONE", ""),
            ("TAGS_0", "a"),
            ("TAGS_1", "b"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(env, expected);

        let mut again = BTreeMap::new();
        flatten_env(&values, None, &mut again);
        assert_eq!(env, again);
    }
}
