//! Step kinds and the loaders that recognize them
//!
//! A raw step definition is offered to each registered [`StepLoader`] in turn.
//! The first loader that recognizes the shape builds the [`Step`]; loaders
//! return `Ok(None)` for shapes that are not theirs.

use crate::config::{RunnerConfig, StepDefinition};
use crate::error::{ConfigError, ConfigResult, ExecutionError, Result};
use crate::runner::{artifact, command, ExecutionContext};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// One unit of work in a task body
#[derive(Debug, Clone)]
pub enum Step {
    Script(ScriptStep),
    Task(TaskStep),
    Or(OrStep),
    If(IfStep),
}

/// Runs a rendered script through the script runner
#[derive(Debug, Clone)]
pub struct ScriptStep {
    pub name: String,
    pub script: String,
    pub runner: RunnerConfig,
    pub silent: bool,
}

/// Invokes another task
#[derive(Debug, Clone)]
pub struct TaskStep {
    pub name: String,
    /// Short key of the task to run
    pub task: String,
    /// Values passed to the task; strings are rendered first
    pub inputs: Map<String, Value>,
    pub silent: bool,
}

/// Runs alternatives until one succeeds
#[derive(Debug, Clone)]
pub struct OrStep {
    pub name: String,
    pub alternatives: Vec<Step>,
    pub silent: bool,
}

/// Runs `then` when the `if` chain succeeds, `else` otherwise
#[derive(Debug, Clone)]
pub struct IfStep {
    pub name: String,
    pub condition: Vec<Step>,
    pub then: Vec<Step>,
    pub otherwise: Option<Vec<Step>>,
    pub silent: bool,
}

impl Step {
    pub fn name(&self) -> &str {
        match self {
            Step::Script(step) => &step.name,
            Step::Task(step) => &step.name,
            Step::Or(step) => &step.name,
            Step::If(step) => &step.name,
        }
    }

    /// Whether the output is left out of the task's aggregated output
    pub fn silenced(&self) -> bool {
        match self {
            Step::Script(step) => step.silent,
            Step::Task(step) => step.silent,
            Step::Or(step) => step.silent,
            Step::If(step) => step.silent,
        }
    }

    pub fn run(&self, ctx: &ExecutionContext<'_>) -> Result<String> {
        debug!(task = %ctx.key(), step = self.name(), "running step");
        match self {
            Step::Script(step) => step.run(ctx),
            Step::Task(step) => step.run(ctx),
            Step::Or(step) => step.run(ctx),
            Step::If(step) => step.run(ctx),
        }
    }
}

impl ScriptStep {
    fn run(&self, ctx: &ExecutionContext<'_>) -> Result<String> {
        let template_name = ctx.template_name(&self.name);
        let script = ctx.render(&self.script, &template_name)?;
        let runner = render_runner(ctx, &self.runner, &template_name)?;
        let script = if runner.artifacts.is_empty() {
            script
        } else {
            artifact::wrap_script(ctx, &script, &runner.artifacts, &template_name)?
        };
        command::run_script(ctx, &script, &runner)
    }
}

/// Render every templated field of a runner
fn render_runner(
    ctx: &ExecutionContext<'_>,
    runner: &RunnerConfig,
    template_name: &str,
) -> Result<RunnerConfig> {
    let render = |s: &str| ctx.render(s, template_name);
    let render_all = |items: &[String]| -> Result<Vec<String>> {
        items
            .iter()
            .map(|s| -> Result<String> { Ok(render(s)?) })
            .collect()
    };

    Ok(RunnerConfig {
        image: render(&runner.image)?,
        command: render(&runner.command)?,
        entrypoint: render(&runner.entrypoint)?,
        args: render_all(&runner.args)?,
        envfile: render(&runner.envfile)?,
        env: runner
            .env
            .iter()
            .map(|(k, v)| -> Result<(String, String)> { Ok((k.clone(), render(v)?)) })
            .collect::<Result<_>>()?,
        volumes: render_all(&runner.volumes)?,
        net: render(&runner.net)?,
        workdir: render(&runner.workdir)?,
        artifacts: runner.artifacts.clone(),
    })
}

impl TaskStep {
    fn run(&self, ctx: &ExecutionContext<'_>) -> Result<String> {
        let template_name = ctx.template_name(&self.name);
        let mut provided = Map::new();
        for (key, value) in &self.inputs {
            let value = match value {
                Value::String(s) => Value::String(ctx.render(s, &template_name)?),
                other => other.clone(),
            };
            provided.insert(key.clone(), value);
        }
        ctx.run_another_task(&self.task, &[], &provided)
    }
}

impl OrStep {
    fn run(&self, ctx: &ExecutionContext<'_>) -> Result<String> {
        let mut last_error = None;
        for (index, alternative) in self.alternatives.iter().enumerate() {
            match alternative.run(ctx) {
                Ok(output) => return Ok(output),
                Err(e) => {
                    debug!(step = %self.name, alternative = index, error = %e, "alternative failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| ExecutionError::NoAlternatives(self.alternatives.len()).into()))
    }
}

impl IfStep {
    fn run(&self, ctx: &ExecutionContext<'_>) -> Result<String> {
        match run_chain(&self.condition, ctx) {
            Ok(_) => run_chain(&self.then, ctx),
            Err(e) => match &self.otherwise {
                Some(otherwise) => {
                    debug!(step = %self.name, error = %e, "condition failed, running else");
                    run_chain(otherwise, ctx)
                }
                None => Err(e),
            },
        }
    }
}

/// Run steps in order and aggregate their output.
///
/// Each named step's output is bound under its name for the steps after it.
/// Outputs of non-silent steps are joined with newlines; when every step is
/// silent the last output is returned.
pub fn run_chain(steps: &[Step], ctx: &ExecutionContext<'_>) -> Result<String> {
    let mut current = ctx.clone();
    let mut outputs = Vec::new();
    let mut any_loud = false;
    let mut last = String::new();

    for step in steps {
        let output = step.run(&current)?;
        if !step.name().is_empty() {
            let mut bound = Map::new();
            bound.insert(step.name().to_string(), Value::String(output.clone()));
            current = current.with_additional_values(bound);
        }
        if !step.silenced() {
            any_loud = true;
            if !output.is_empty() {
                outputs.push(output.clone());
            }
        }
        last = output;
    }

    Ok(if any_loud { outputs.join("\n") } else { last })
}

/// Recognizes one shape of raw step definition
pub trait StepLoader: Send + Sync {
    /// Build the step, or `Ok(None)` when `definition` is not this loader's shape
    fn load(
        &self,
        task: &str,
        definition: &StepDefinition,
        registry: &StepRegistry,
    ) -> ConfigResult<Option<Step>>;
}

/// Ordered set of step loaders owned by an application
pub struct StepRegistry {
    loaders: Vec<Box<dyn StepLoader>>,
}

impl Default for StepRegistry {
    fn default() -> Self {
        let mut registry = StepRegistry::new();
        registry.register(ScriptLoader);
        registry.register(TaskLoader);
        registry.register(OrLoader);
        registry.register(IfLoader);
        registry
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("loaders", &self.loaders.len())
            .finish()
    }
}

impl StepRegistry {
    /// A registry without any loaders
    pub fn new() -> Self {
        StepRegistry {
            loaders: Vec::new(),
        }
    }

    pub fn register(&mut self, loader: impl StepLoader + 'static) {
        self.loaders.push(Box::new(loader));
    }

    /// Load `definition` with the first loader that recognizes it
    pub fn load(&self, task: &str, definition: &StepDefinition) -> ConfigResult<Step> {
        for loader in &self.loaders {
            if let Some(step) = loader.load(task, definition, self)? {
                return Ok(step);
            }
        }
        Err(invalid(
            task,
            definition,
            "unknown step kind: expected one of script, task, or, if",
        ))
    }

    /// Load a list of nested step definitions found under `key`
    fn load_list(
        &self,
        task: &str,
        definition: &StepDefinition,
        key: &str,
    ) -> ConfigResult<Option<Vec<Step>>> {
        let items = match definition.get(key) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => return Ok(None),
            Some(other) => {
                return Err(invalid(
                    task,
                    definition,
                    format!("'{}' must be a list of steps, got {}", key, other),
                ))
            }
        };

        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let mut map = match item {
                    Value::Object(map) => map.clone(),
                    other => {
                        return Err(invalid(
                            task,
                            definition,
                            format!("'{}' entry {} is not a mapping: {}", key, index + 1, other),
                        ))
                    }
                };
                if !map.get("name").and_then(Value::as_str).is_some_and(|n| !n.is_empty()) {
                    map.insert("name".to_string(), Value::String(format!("step-{}", index + 1)));
                }
                self.load(task, &StepDefinition(map))
            })
            .collect::<ConfigResult<Vec<_>>>()
            .map(Some)
    }
}

fn invalid(task: &str, definition: &StepDefinition, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidStep {
        task: task.to_string(),
        step: definition.name().unwrap_or("<unnamed>").to_string(),
        reason: reason.into(),
    }
}

fn step_name(definition: &StepDefinition) -> String {
    definition.name().unwrap_or_default().to_string()
}

/// `{script: <string>, runner?: {...}, silent?: bool}`
pub struct ScriptLoader;

impl StepLoader for ScriptLoader {
    fn load(
        &self,
        task: &str,
        definition: &StepDefinition,
        _registry: &StepRegistry,
    ) -> ConfigResult<Option<Step>> {
        let Some(script) = definition.str("script") else {
            return Ok(None);
        };
        let runner = match definition.get("runner") {
            Some(Value::Null) | None => RunnerConfig::default(),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| invalid(task, definition, format!("invalid runner: {}", e)))?,
        };
        Ok(Some(Step::Script(ScriptStep {
            name: step_name(definition),
            script: script.to_string(),
            runner,
            silent: definition.bool("silent"),
        })))
    }
}

/// `{task: <key>, inputs?|arguments?: {name: value}, silent?: bool}`
pub struct TaskLoader;

impl StepLoader for TaskLoader {
    fn load(
        &self,
        task: &str,
        definition: &StepDefinition,
        _registry: &StepRegistry,
    ) -> ConfigResult<Option<Step>> {
        let Some(target) = definition.str("task") else {
            return Ok(None);
        };
        let inputs = match definition.get("inputs").or_else(|| definition.get("arguments")) {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(other) => {
                return Err(invalid(
                    task,
                    definition,
                    format!("inputs must be a mapping, got {}", other),
                ))
            }
        };
        Ok(Some(Step::Task(TaskStep {
            name: step_name(definition),
            task: target.to_string(),
            inputs,
            silent: definition.bool("silent"),
        })))
    }
}

/// `{or: [step, ...]}`
pub struct OrLoader;

impl StepLoader for OrLoader {
    fn load(
        &self,
        task: &str,
        definition: &StepDefinition,
        registry: &StepRegistry,
    ) -> ConfigResult<Option<Step>> {
        let Some(alternatives) = registry.load_list(task, definition, "or")? else {
            return Ok(None);
        };
        if alternatives.is_empty() {
            return Err(invalid(task, definition, "'or' needs at least one step"));
        }
        Ok(Some(Step::Or(OrStep {
            name: step_name(definition),
            alternatives,
            silent: definition.bool("silent"),
        })))
    }
}

/// `{if: [step, ...], then: [step, ...], else?: [step, ...]}`
pub struct IfLoader;

impl StepLoader for IfLoader {
    fn load(
        &self,
        task: &str,
        definition: &StepDefinition,
        registry: &StepRegistry,
    ) -> ConfigResult<Option<Step>> {
        if definition.get("if").is_none() || definition.get("then").is_none() {
            return Ok(None);
        }
        let condition = registry.load_list(task, definition, "if")?.unwrap_or_default();
        let then = registry.load_list(task, definition, "then")?.unwrap_or_default();
        let otherwise = registry.load_list(task, definition, "else")?;
        Ok(Some(Step::If(IfStep {
            name: step_name(definition),
            condition,
            then,
            otherwise,
            silent: definition.bool("silent"),
        })))
    }
}
