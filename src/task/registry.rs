//! Task storage keyed by short name

use crate::config::TaskDefinition;
use crate::error::{ConfigError, ConfigResult};
use crate::runner::StepRegistry;
use crate::task::{Namer, Task, TaskName};
use indexmap::IndexMap;

/// All tasks of an application, in depth-first declaration order
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: IndexMap<String, Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `definition` and all of its descendants
    pub fn register_tasks(
        &mut self,
        namer: &Namer,
        definition: &TaskDefinition,
        steps: &StepRegistry,
    ) -> ConfigResult<()> {
        self.register_tree(namer.root(), definition, steps)
    }

    fn register_tree(
        &mut self,
        name: TaskName,
        definition: &TaskDefinition,
        steps: &StepRegistry,
    ) -> ConfigResult<()> {
        let loaded = definition
            .step_definitions()?
            .iter()
            .map(|step| steps.load(&name.string(), step))
            .collect::<ConfigResult<Vec<_>>>()?;

        self.register(Task::new(name.clone(), definition.clone(), loaded))?;

        for child in &definition.children {
            self.register_tree(name.child(&child.name), child, steps)?;
        }
        Ok(())
    }

    /// Add a single task, creating structural parents for it when missing
    pub fn register(&mut self, task: Task) -> ConfigResult<()> {
        let key = task.name.short();
        if self.tasks.contains_key(&key) {
            return Err(ConfigError::DuplicateTask(task.name.string()));
        }

        if !task.name.is_root() {
            let parent_name = task.name.parent()?;
            let parent_key = parent_name.short();
            if !self.tasks.contains_key(&parent_key) {
                let definition = TaskDefinition {
                    name: parent_name.simple().to_string(),
                    ..Default::default()
                };
                self.register(Task::new(parent_name.clone(), definition, Vec::new()))?;
            }
            if let Some(parent) = self.tasks.get_mut(&parent_key) {
                if !parent.children.contains(&task.name) {
                    parent.children.push(task.name.clone());
                }
            }
        }

        self.tasks.insert(key, task);
        Ok(())
    }

    pub fn find_task(&self, name: &TaskName) -> Option<&Task> {
        self.tasks.get(&name.short())
    }

    pub fn find_task_mut(&mut self, name: &TaskName) -> Option<&mut Task> {
        self.tasks.get_mut(&name.short())
    }

    pub fn all_task_keys(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Direct children of `name`, in declaration order
    pub fn children_of(&self, name: &TaskName) -> Vec<&Task> {
        self.find_task(name)
            .map(|task| {
                task.children
                    .iter()
                    .filter_map(|child| self.find_task(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
