//! Task execution engine
//!
//! This module resolves input values, renders scripts and executes the steps
//! of a task.

pub mod artifact;
pub mod command;
pub mod context;
pub mod resolve;
pub mod step;
pub mod task;
pub mod template;

// Re-export main types
pub use command::{run_script, STDERR_PREFIX};
pub use context::*;
pub use resolve::*;
pub use step::*;
pub use task::*;
pub use template::{render, Template};
