//! Dotted task names

use crate::error::{ConfigError, ConfigResult};
use crate::utils::split_path;
use std::fmt;

/// Fully qualified name of a task: the application name followed by the path
/// of the task inside the Taskfile tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskName {
    segments: Vec<String>,
}

impl TaskName {
    pub fn new(segments: Vec<String>) -> Self {
        TaskName { segments }
    }

    /// Parse a dotted string such as `app.deploy.web`
    pub fn parse(dotted: &str) -> Self {
        TaskName::new(split_path(dotted).into_iter().map(str::to_string).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment
    pub fn simple(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Dotted form including the application name
    pub fn string(&self) -> String {
        self.segments.join(".")
    }

    /// Dotted form without the application name
    pub fn short(&self) -> String {
        self.segments.iter().skip(1).cloned().collect::<Vec<_>>().join(".")
    }

    /// The enclosing task's name
    pub fn parent(&self) -> ConfigResult<TaskName> {
        if self.segments.len() <= 1 {
            return Err(ConfigError::NoParent(self.string()));
        }
        Ok(TaskName::new(self.segments[..self.segments.len() - 1].to_vec()))
    }

    /// Name of a direct child
    pub fn child(&self, simple: &str) -> TaskName {
        let mut segments = self.segments.clone();
        segments.push(simple.to_string());
        TaskName::new(segments)
    }

    pub fn is_root(&self) -> bool {
        self.segments.len() <= 1
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string())
    }
}

/// Builds task names rooted at the application name
#[derive(Debug, Clone)]
pub struct Namer {
    app: String,
}

impl Namer {
    pub fn new(app: impl Into<String>) -> Self {
        Namer { app: app.into() }
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    /// Name of the root task
    pub fn root(&self) -> TaskName {
        TaskName::new(vec![self.app.clone()])
    }

    /// Task name for a short key, so that input `a.b` maps to task `<app>.a.b`
    pub fn from_short(&self, short: &str) -> TaskName {
        let mut segments = vec![self.app.clone()];
        segments.extend(split_path(short).into_iter().map(str::to_string));
        TaskName::new(segments)
    }

    /// Task name for a path of segments below the root
    pub fn from_path(&self, path: &[&str]) -> TaskName {
        self.from_short(&path.join("."))
    }
}
