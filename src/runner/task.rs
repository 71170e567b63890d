//! Task execution
//!
//! A task either calls its inline function or validates its bound values and
//! runs its steps in order.

use crate::config::validate_values;
use crate::error::{Result, VariantError};
use crate::runner::{run_chain, ExecutionContext};
use crate::task::Task;
use tracing::debug;

/// Runs one task with a prepared context
pub struct TaskRunner<'a> {
    task: &'a Task,
}

impl<'a> TaskRunner<'a> {
    pub fn new(task: &'a Task) -> Self {
        TaskRunner { task }
    }

    /// Execute the task and return its aggregated output
    pub fn run(&self, ctx: &ExecutionContext<'_>) -> Result<String> {
        if let Some(func) = &self.task.func {
            debug!(task = %self.task.name, "running inline function");
            return func(ctx).map_err(VariantError::Function);
        }

        validate_values(&self.task.name.string(), self.task.inputs(), ctx.vars())?;

        debug!(task = %self.task.name, steps = self.task.steps.len(), "running steps");
        let output = run_chain(&self.task.steps, ctx)?;
        debug!(task = %self.task.name, "task complete");
        Ok(output)
    }
}
