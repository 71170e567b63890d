//! Taskfile and configuration loading
//!
//! This module handles parsing Taskfiles in all supported dialects, validating
//! the resulting task tree, and reading layered configuration values.

pub mod environment;
pub mod parse;
pub mod schema;
pub mod settings;
pub mod types;

// Re-export main types
pub use environment::*;
pub use parse::*;
pub use schema::*;
pub use settings::*;
pub use types::*;
