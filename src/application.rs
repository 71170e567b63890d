//! Application context
//!
//! An [`Application`] owns everything built from one Taskfile: the task
//! registry with resolved inputs, the step loaders, configuration, and the
//! outputs of producer tasks memoized during one top-level invocation.

use crate::config::{parse_definition, validate_definition, InputConfig, Settings, TaskDefinition};
use crate::error::{ResolutionError, Result, VariantError};
use crate::runner::{ExecutionContext, StepRegistry, TaskRunner, ValueResolver};
use crate::task::{InputResolver, Namer, Task, TaskFn, TaskName, TaskRegistry};
use crate::utils::{get_value_at_path, set_value_at_path};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::sync::Arc;
use tracing::debug;

/// Process-wide state for one Taskfile
pub struct Application {
    /// Application name; the first segment of every task name
    pub name: String,
    pub namer: Namer,
    pub registry: TaskRegistry,
    pub settings: Settings,

    /// Environment selected for this working directory
    environment: Option<String>,

    /// Producer task outputs keyed by dotted input name
    cached_outputs: RefCell<Value>,
}

impl Application {
    /// Build an application from a loaded task tree
    pub fn new(name: &str, definition: &TaskDefinition, settings: Settings) -> Result<Self> {
        Application::with_steps(name, definition, settings, StepRegistry::default())
    }

    /// Build an application that loads steps with a custom registry
    pub fn with_steps(
        name: &str,
        definition: &TaskDefinition,
        settings: Settings,
        steps: StepRegistry,
    ) -> Result<Self> {
        validate_definition(definition)?;

        let namer = Namer::new(name);
        let mut registry = TaskRegistry::new();
        registry.register_tasks(&namer, definition, &steps)?;
        debug!(app = name, tasks = registry.len(), "registered tasks");

        let mut app = Application {
            name: name.to_string(),
            namer,
            registry,
            settings,
            environment: None,
            cached_outputs: RefCell::new(Value::Object(Map::new())),
        };
        app.resolve_inputs();
        Ok(app)
    }

    /// Parse `yaml` and build an application from it
    pub fn from_yaml(name: &str, yaml: &str, settings: Settings) -> Result<Self> {
        let definition = parse_definition(yaml, name)?;
        Application::new(name, &definition, settings)
    }

    pub fn with_environment(mut self, environment: Option<String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Register an in-process task at `path` below the root
    pub fn register_function<F>(
        &mut self,
        path: &[&str],
        inputs: Vec<InputConfig>,
        func: F,
    ) -> Result<()>
    where
        F: Fn(&ExecutionContext<'_>) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        let name = self.namer.from_path(path);
        let func: TaskFn = Arc::new(func);
        self.registry.register(Task::function(name, inputs, func))?;
        self.resolve_inputs();
        Ok(())
    }

    /// Recompute the transitive inputs of every task
    fn resolve_inputs(&mut self) {
        let resolved: Vec<_> = {
            let resolver = InputResolver::new(&self.registry, &self.namer);
            self.registry
                .tasks()
                .map(|task| (task.name.clone(), resolver.resolve_inputs_for_task(task)))
                .collect()
        };
        for (name, inputs) in resolved {
            if let Some(task) = self.registry.find_task_mut(&name) {
                task.resolved_inputs = inputs;
            }
        }
    }

    /// Run `name` as a top-level invocation
    pub fn run(
        &self,
        name: &TaskName,
        args: &[String],
        provided: &Map<String, Value>,
    ) -> Result<String> {
        *self.cached_outputs.borrow_mut() = Value::Object(Map::new());
        self.run_task_for_key(name, args, provided, &[], false)
            .map_err(|e| VariantError::Command {
                path: name.string(),
                source: Box::new(e),
            })
    }

    /// Resolve the values of `name` and run it.
    ///
    /// `callers` is the chain of tasks that led here, outermost first. A task
    /// already on that chain is a cycle.
    pub fn run_task_for_key(
        &self,
        name: &TaskName,
        args: &[String],
        provided: &Map<String, Value>,
        callers: &[TaskName],
        as_input: bool,
    ) -> Result<String> {
        let task = self
            .registry
            .find_task(name)
            .ok_or_else(|| ResolutionError::TaskNotFound(name.string()))?;

        if callers.contains(name) {
            let chain = callers
                .iter()
                .chain(std::iter::once(name))
                .map(TaskName::string)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(ResolutionError::Cycle(chain).into());
        }

        debug!(task = %name, as_input, "running task");
        self.run_resolved(task, args, provided, callers, as_input)
            .map_err(|e| e.in_task(name.string()))
    }

    fn run_resolved(
        &self,
        task: &Task,
        args: &[String],
        provided: &Map<String, Value>,
        callers: &[TaskName],
        as_input: bool,
    ) -> Result<String> {
        let values =
            ValueResolver::new(self).inherited_input_values(task, args, provided, callers)?;
        let ctx = ExecutionContext::new(self, task, values, callers.to_vec(), as_input);
        TaskRunner::new(task).run(&ctx)
    }

    /// Memoized producer output at `path`
    pub fn cached_output(&self, path: &[&str]) -> Result<Option<Value>> {
        let cache = self.cached_outputs.borrow();
        Ok(get_value_at_path(&cache, path)?.cloned())
    }

    pub fn cache_output(&self, path: &[&str], value: Value) -> Result<()> {
        let mut cache = self.cached_outputs.borrow_mut();
        match &mut *cache {
            Value::Object(map) => Ok(set_value_at_path(map, path, value)?),
            other => Err(VariantError::Internal(format!("cache value {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_cycle_fails_at_run_time() {
        let yaml = r#"
tasks:
  a:
    steps:
      - task: b
  b:
    steps:
      - task: a
"#;
        let app = Application::from_yaml("app", yaml, Settings::new("app")).unwrap();
        let err = app
            .run(&TaskName::parse("app.a"), &[], &Map::new())
            .unwrap_err();
        assert!(matches!(
            err.root_cause(),
            VariantError::Resolution(ResolutionError::Cycle(_))
        ));
    }

    #[test]
    fn test_recursion_in_untaken_branch_runs() {
        let yaml = r#"
tasks:
  loop:
    steps:
      - if:
          - script: "true"
        then:
          - script: echo done
        else:
          - task: loop
"#;
        let app = Application::from_yaml("app", yaml, Settings::new("app")).unwrap();
        assert_eq!(
            app.run(&TaskName::parse("app.loop"), &[], &Map::new()).unwrap(),
            "done"
        );
    }

    #[test]
    fn test_register_function_resolves_inputs() {
        let mut app = Application::from_yaml("app", "tasks: {}\n", Settings::new("app")).unwrap();
        app.register_function(&["should", "succeed"], vec![InputConfig::new("input")], |ctx| {
            Ok(ctx.string("input").unwrap_or_default())
        })
        .unwrap();

        let task = app
            .registry
            .find_task(&TaskName::parse("app.should.succeed"))
            .unwrap();
        assert_eq!(task.resolved_inputs.len(), 1);
        assert!(app
            .registry
            .find_task(&TaskName::parse("app.should"))
            .is_some());
    }

    #[test]
    fn test_cache_round_trip() {
        let app = Application::from_yaml("app", "tasks: {}\n", Settings::new("app")).unwrap();
        assert_eq!(app.cached_output(&["a", "b"]).unwrap(), None);
        app.cache_output(&["a", "b"], Value::String("x".to_string()))
            .unwrap();
        assert_eq!(
            app.cached_output(&["a", "b"]).unwrap(),
            Some(Value::String("x".to_string()))
        );
    }

    #[test]
    fn test_unknown_task() {
        let app = Application::from_yaml("app", "tasks: {}\n", Settings::new("app")).unwrap();
        let err = app
            .run(&TaskName::parse("app.nope"), &[], &Map::new())
            .unwrap_err();
        assert!(matches!(
            err.root_cause(),
            VariantError::Resolution(ResolutionError::TaskNotFound(_))
        ));
    }
}
