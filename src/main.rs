use colored::Colorize;
use std::error::Error;
use std::process;
use variant::VariantError;

fn main() {
    if let Err(e) = variant::cli::run() {
        if let VariantError::Usage(usage) = &e {
            usage.exit();
        }

        eprintln!("{} {}", "Error:".red().bold(), e);
        if tracing::enabled!(tracing::Level::DEBUG) {
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  {}", cause);
                source = cause.source();
            }
        } else {
            let root = e.root_cause();
            if !std::ptr::eq(root, &e) {
                eprintln!("{} {}", "Caused by:".yellow(), root);
            }
        }
        process::exit(1);
    }
}
