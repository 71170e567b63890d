//! Log output setup
//!
//! Logs are written with `tracing`. The subscriber installed here picks the
//! output format, level filter, colors and destination from global flags.

use colored::{Color, Colorize};
use std::fmt;
use std::io::{self, IsTerminal};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Supported `--output` formats
pub const OUTPUT_FORMATS: &[&str] = &["message", "text", "json", "bunyan"];

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// `<level>: <message>`, colored per level
    #[default]
    Message,
    Text,
    Json,
    Bunyan,
}

impl OutputFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "message" => Some(OutputFormat::Message),
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            "bunyan" => Some(OutputFormat::Bunyan),
            _ => None,
        }
    }
}

/// Color used for each level in the message format
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelColors {
    pub error: Color,
    pub warn: Color,
    pub info: Color,
    pub debug: Color,
}

impl Default for LevelColors {
    fn default() -> Self {
        LevelColors {
            error: Color::Red,
            warn: Color::Yellow,
            info: Color::Green,
            debug: Color::BrightBlack,
        }
    }
}

impl LevelColors {
    fn for_level(&self, level: Level) -> Color {
        match level {
            Level::ERROR => self.error,
            Level::WARN => self.warn,
            Level::INFO => self.info,
            _ => self.debug,
        }
    }
}

/// Everything that configures logging
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Explicit filter directive such as `debug` or `variant=trace`
    pub level: Option<String>,
    pub verbose: bool,
    pub output: OutputFormat,
    /// Forced color choice; detected from the terminal when unset
    pub color: Option<bool>,
    pub to_stderr: bool,
    pub colors: LevelColors,
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(options: &LogOptions) {
    let filter = match &options.level {
        Some(level) => EnvFilter::new(level),
        None if options.verbose => EnvFilter::new("debug"),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let ansi = options.color.unwrap_or_else(|| {
        if options.to_stderr {
            io::stderr().is_terminal()
        } else {
            io::stdout().is_terminal()
        }
    });
    colored::control::set_override(ansi);

    let writer = if options.to_stderr {
        BoxMakeWriter::new(io::stderr)
    } else {
        BoxMakeWriter::new(io::stdout)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);

    let _ = match options.output {
        OutputFormat::Message => builder
            .event_format(MessageFormat {
                colors: options.colors,
            })
            .try_init(),
        OutputFormat::Text => builder.try_init(),
        OutputFormat::Json | OutputFormat::Bunyan => builder.json().try_init(),
    };
}

/// `<level>: <message> <fields>`
struct MessageFormat {
    colors: LevelColors,
}

impl<S, N> FormatEvent<S, N> for MessageFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = *event.metadata().level();
        let label = level_label(level);
        if writer.has_ansi_escapes() {
            write!(writer, "{}: ", label.color(self.colors.for_level(level)))?;
        } else {
            write!(writer, "{}: ", label)?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn level_label(level: Level) -> &'static str {
    match level {
        Level::ERROR => "error",
        Level::WARN => "warn",
        Level::INFO => "info",
        Level::DEBUG => "debug",
        Level::TRACE => "trace",
    }
}

/// Parse a color name such as `red` or `bright blue`
pub fn parse_color(name: &str) -> Option<Color> {
    name.parse().ok()
}
