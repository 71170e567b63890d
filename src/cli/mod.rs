//! CLI interface and argument parsing
//!
//! This module builds the command tree from the loaded tasks, handles the
//! built-in `env` and `completion` subcommands, and sets up logging.

pub mod app;
pub mod logging;

// Re-export main types
pub use app::*;
pub use logging::{LogOptions, OutputFormat};
