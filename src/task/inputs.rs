//! Transitive input resolution
//!
//! An input whose name matches another task's short key is produced by that
//! task, so everything the producer needs is needed by the consumer too. The
//! resolved list is what the CLI exposes as flags and what value resolution
//! iterates over.

use crate::config::InputConfig;
use crate::task::{Namer, Task, TaskName, TaskRegistry};
use std::collections::HashSet;

/// A declared input together with the task that declared it
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInput {
    pub config: InputConfig,

    /// Task declaring the input
    pub task_key: TaskName,

    /// `<app>.<input name>`; also the name of the producer task, if any
    pub full_name: TaskName,
}

impl ResolvedInput {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Full name without the application segment
    pub fn short_name(&self) -> String {
        self.full_name.short()
    }

    /// Flag name for the input: dots become dashes
    pub fn flag_name(&self) -> String {
        self.config.name.replace('.', "-")
    }
}

/// Computes the inputs each task transitively depends on
pub struct InputResolver<'a> {
    registry: &'a TaskRegistry,
    namer: &'a Namer,
}

impl<'a> InputResolver<'a> {
    pub fn new(registry: &'a TaskRegistry, namer: &'a Namer) -> Self {
        InputResolver { registry, namer }
    }

    /// Inputs of `task` followed by the inputs of the tasks producing them,
    /// depth first
    pub fn resolve_inputs_for_task(&self, task: &Task) -> Vec<ResolvedInput> {
        let mut visited_tasks = HashSet::new();
        let mut seen_inputs = HashSet::new();
        let mut resolved = Vec::new();
        self.collect(task, &mut visited_tasks, &mut seen_inputs, &mut resolved);
        resolved
    }

    fn collect(
        &self,
        task: &Task,
        visited_tasks: &mut HashSet<TaskName>,
        seen_inputs: &mut HashSet<TaskName>,
        resolved: &mut Vec<ResolvedInput>,
    ) {
        // Cycles are reported when the tasks actually run.
        if !visited_tasks.insert(task.name.clone()) {
            return;
        }

        // A task's own declarations take precedence over its producers'.
        let full_names: Vec<TaskName> = task
            .inputs()
            .iter()
            .map(|input| self.namer.from_short(&input.name))
            .collect();
        for (input, full_name) in task.inputs().iter().zip(&full_names) {
            if seen_inputs.insert(full_name.clone()) {
                resolved.push(ResolvedInput {
                    config: input.clone(),
                    task_key: task.name.clone(),
                    full_name: full_name.clone(),
                });
            }
        }

        for full_name in full_names {
            if full_name == task.name {
                continue;
            }
            if let Some(producer) = self.registry.find_task(&full_name) {
                self.collect(producer, visited_tasks, seen_inputs, resolved);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_definition;
    use crate::runner::StepRegistry;

    fn resolved_names(yaml: &str, task: &str) -> Vec<String> {
        let namer = Namer::new("app");
        let root = parse_definition(yaml, "app").unwrap();
        let mut registry = TaskRegistry::new();
        registry
            .register_tasks(&namer, &root, &StepRegistry::default())
            .unwrap();
        let resolver = InputResolver::new(&registry, &namer);
        let task = registry.find_task(&namer.from_short(task)).unwrap();
        resolver
            .resolve_inputs_for_task(task)
            .iter()
            .map(|input| format!("{}@{}", input.short_name(), input.task_key.short()))
            .collect()
    }

    #[test]
    fn test_transitive_inputs() {
        let yaml = r#"
tasks:
  deploy:
    inputs:
      - name: cluster
      - name: tag
    script: echo {{ .cluster }} {{ .tag }}
  cluster:
    inputs:
      - name: region
    script: echo {{ .region }}-main
"#;
        assert_eq!(
            resolved_names(yaml, "deploy"),
            vec!["cluster@deploy", "tag@deploy", "region@cluster"]
        );
    }

    #[test]
    fn test_deduplicates_by_full_name() {
        let yaml = r#"
tasks:
  a:
    inputs:
      - name: b
      - name: shared
    script: echo
  b:
    inputs:
      - name: shared
    script: echo
"#;
        assert_eq!(resolved_names(yaml, "a"), vec!["b@a", "shared@a"]);
    }

    #[test]
    fn test_cyclic_inputs_terminate() {
        let yaml = r#"
tasks:
  a:
    inputs:
      - name: b
    script: echo
  b:
    inputs:
      - name: a
    script: echo
"#;
        assert_eq!(resolved_names(yaml, "a"), vec!["b@a", "a@b"]);
    }

    #[test]
    fn test_flag_name() {
        let input = ResolvedInput {
            config: InputConfig::new("aws.region"),
            task_key: TaskName::parse("app.deploy"),
            full_name: TaskName::parse("app.aws.region"),
        };
        assert_eq!(input.flag_name(), "aws-region");
        assert_eq!(input.short_name(), "aws.region");
    }
}
