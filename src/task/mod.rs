//! Resolved tasks
//!
//! A [`Task`] is a node of the loaded Taskfile tree with its fully qualified
//! name, loaded steps and the transitive set of inputs it depends on.

pub mod inputs;
pub mod name;
pub mod registry;

pub use inputs::*;
pub use name::*;
pub use registry::*;

use crate::config::{InputConfig, StepDefinition, TaskDefinition};
use crate::error::ConfigResult;
use crate::runner::{ExecutionContext, Step};
use std::fmt;
use std::sync::Arc;

/// In-process task body, used instead of steps when set
pub type TaskFn = Arc<dyn Fn(&ExecutionContext<'_>) -> anyhow::Result<String> + Send + Sync>;

/// Runtime task representation
#[derive(Clone)]
pub struct Task {
    /// Fully qualified name
    pub name: TaskName,

    /// Definition this task was loaded from, without its children
    pub definition: TaskDefinition,

    /// Loaded steps, in execution order
    pub steps: Vec<Step>,

    /// Every input this task depends on, including those of producer tasks
    pub resolved_inputs: Vec<ResolvedInput>,

    /// Names of direct children
    pub children: Vec<TaskName>,

    /// Inline body registered from Rust code
    pub func: Option<TaskFn>,
}

impl Task {
    pub fn new(name: TaskName, mut definition: TaskDefinition, steps: Vec<Step>) -> Self {
        let children = definition
            .children
            .drain(..)
            .map(|child| name.child(&child.name))
            .collect();
        Task {
            name,
            definition,
            steps,
            resolved_inputs: Vec::new(),
            children,
            func: None,
        }
    }

    /// Task whose body is the given function
    pub fn function(name: TaskName, inputs: Vec<InputConfig>, func: TaskFn) -> Self {
        let definition = TaskDefinition {
            name: name.simple().to_string(),
            inputs,
            ..Default::default()
        };
        let mut task = Task::new(name, definition, Vec::new());
        task.func = Some(func);
        task
    }

    pub fn inputs(&self) -> &[InputConfig] {
        &self.definition.inputs
    }

    /// Whether running this task does anything
    pub fn is_runnable(&self) -> bool {
        self.func.is_some() || !self.steps.is_empty()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .field("resolved_inputs", &self.resolved_inputs)
            .field("children", &self.children)
            .field("func", &self.func.is_some())
            .finish()
    }
}

impl TaskDefinition {
    /// Steps to load for this task; a bare `script` becomes one step named `script`
    pub fn step_definitions(&self) -> ConfigResult<Vec<StepDefinition>> {
        match &self.script {
            Some(script) => Ok(vec![StepDefinition::script(
                "script",
                script,
                self.runner.as_ref(),
            )?]),
            None => Ok(self.steps.clone()),
        }
    }
}
