//! Variant - turn a YAML Taskfile into a CLI
//!
//! Tasks declared in a Taskfile become nested subcommands. Their inputs are
//! resolved from flags, positional arguments, configuration files, defaults,
//! and the outputs of other tasks, then their scripts run through a shell or
//! a container.

// Public modules
pub mod application;
pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod task;
pub mod utils;

// Re-export commonly used types
pub use application::Application;
pub use error::{Result, VariantError};

/// Current version of Variant
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
