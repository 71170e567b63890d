//! Main CLI application
//!
//! The command tree mirrors the task tree: every task becomes a subcommand,
//! and every input a task depends on becomes a `--flag`. Flag values are bound
//! into the settings overlay before the selected task runs.

use crate::application::Application;
use crate::cli::logging::{self, LevelColors, LogOptions, OutputFormat, OUTPUT_FORMATS};
use crate::config::{
    app_name_for, find_taskfile, parse_taskfile, read_environment, write_environment, InputType,
    Settings, SettingsSources, VARFILE_ENV,
};
use crate::error::{ConfigError, Result, VariantError};
use crate::task::{ResolvedInput, Task, TaskName};
use crate::utils::args_from_env;
use clap::builder::PossibleValuesParser;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;
use serde_json::{Map, Value};
use std::env;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info};

/// Id of the positional arguments of a leaf task
const ARGS_ID: &str = "ARGS";

/// Global flags; inputs whose flag would collide with one are not exposed
const GLOBAL_FLAGS: &[&str] = &[
    "verbose",
    "output",
    "color",
    "no-color",
    "config-file",
    "config-context",
    "config-dir",
    "logtostderr",
    "log-level",
    "color-error",
    "color-warn",
    "color-info",
    "color-debug",
    "file",
    "help",
    "version",
];

const ENV_COMMAND: &str = "env";
const COMPLETION_COMMAND: &str = "completion";

/// CLI application
pub struct Cli {
    app: Application,
    /// Read config files before running a task
    load_settings: bool,

    /// Path the Taskfile was loaded from
    taskfile: Option<PathBuf>,
}

impl Cli {
    /// Load the Taskfile selected by the environment or `args`
    pub fn load(args: &[String]) -> Result<Self> {
        let path = match env::var(VARFILE_ENV).ok().filter(|p| !p.is_empty()) {
            Some(path) => PathBuf::from(path),
            None => match extract_file_arg(args) {
                Some(path) => path,
                None => find_taskfile()?,
            },
        };
        debug!(path = %path.display(), "loading Taskfile");

        let name = app_name_for(&path);
        let definition = parse_taskfile(&path, &name)?;
        let environment = read_environment(&env::current_dir()?, &name)?;
        let app = Application::new(&name, &definition, Settings::new(&name))?
            .with_environment(environment);

        Ok(Cli {
            app,
            load_settings: true,
            taskfile: Some(path),
        })
    }

    /// Create a CLI over an already built application, using its settings as is
    pub fn new(app: Application) -> Self {
        Cli {
            app,
            load_settings: false,
            taskfile: None,
        }
    }

    pub fn app(&self) -> &Application {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut Application {
        &mut self.app
    }

    /// Build the clap command tree from the task registry
    pub fn command(&self) -> Command {
        let root = self.app.namer.root();
        let mut cmd = Command::new(self.app.name.clone())
            .version(crate::VERSION)
            .about("Run tasks defined in a YAML Taskfile");
        for arg in global_args() {
            cmd = cmd.arg(arg);
        }

        if let Some(task) = self.app.registry.find_task(&root) {
            cmd = self.task_command(task, cmd);
        }

        if !self.has_root_child(ENV_COMMAND) {
            cmd = cmd.subcommand(env_command());
        }
        if !self.has_root_child(COMPLETION_COMMAND) {
            cmd = cmd.subcommand(completion_command());
        }
        cmd
    }

    fn has_root_child(&self, simple: &str) -> bool {
        let name = self.app.namer.root().child(simple);
        self.app.registry.find_task(&name).is_some()
    }

    fn task_command(&self, task: &Task, mut cmd: Command) -> Command {
        if !task.definition.description.is_empty() {
            cmd = cmd.about(task.definition.description.clone());
        }

        let children = self.app.registry.children_of(&task.name);
        for input in &task.resolved_inputs {
            let flag = input.flag_name();
            if GLOBAL_FLAGS.contains(&flag.as_str()) {
                debug!(task = %task.name, flag = %flag, "input flag shadowed by a global flag");
                continue;
            }
            cmd = cmd.arg(input_arg(input, !children.is_empty()));
        }

        if children.is_empty() {
            if task.is_runnable() {
                cmd = cmd.arg(
                    Arg::new(ARGS_ID)
                        .num_args(0..)
                        .value_name(ARGS_ID)
                        .help(positional_help(task)),
                );
            }
            return cmd;
        }

        for child in children {
            let sub = Command::new(child.name.simple().to_string());
            cmd = cmd.subcommand(self.task_command(child, sub));
        }
        cmd
    }

    /// Parse `args` and run the selected task.
    ///
    /// Returns the output of an inline function task, which has no script
    /// output of its own to stream.
    pub fn run(mut self, args: &[String]) -> Result<Option<String>> {
        let mut command = self.command();
        let matches = command.try_get_matches_from_mut(args)?;

        let mut task_name = self.app.namer.root();
        let mut path = Vec::new();
        let mut leaf = &matches;
        while let Some((sub, sub_matches)) = leaf.subcommand() {
            path.push(sub.to_string());
            task_name = task_name.child(sub);
            leaf = sub_matches;
        }

        logging::init(&log_options(leaf)?);

        if let Some((first, sub)) = matches.subcommand() {
            if first == ENV_COMMAND && !self.has_root_child(ENV_COMMAND) {
                return self.run_env(sub);
            }
            if first == COMPLETION_COMMAND && !self.has_root_child(COMPLETION_COMMAND) {
                return complete(&mut command, sub);
            }
        }

        let runnable = self
            .app
            .registry
            .find_task(&task_name)
            .is_some_and(Task::is_runnable);
        if !runnable {
            let mut help = command;
            for segment in &path {
                help = match help.find_subcommand(segment) {
                    Some(sub) => sub.clone(),
                    None => break,
                };
            }
            help.print_help()?;
            println!();
            return Ok(None);
        }

        if self.load_settings {
            let mut sources = settings_sources(leaf, self.app.environment());
            sources.taskfile = self.taskfile.clone();
            let settings = Settings::load(&self.app.name, &sources)?;
            *self.app.settings_mut() = settings;
        }
        self.bind_flags(&task_name, leaf)?;

        let positional: Vec<String> = leaf
            .try_get_many::<String>(ARGS_ID)
            .ok()
            .flatten()
            .map(|values| values.cloned().collect())
            .unwrap_or_default();

        let output = self.app.run(&task_name, &positional, &Map::new())?;
        let is_function = self
            .app
            .registry
            .find_task(&task_name)
            .is_some_and(|task| task.func.is_some());
        Ok(is_function.then_some(output))
    }

    /// Bind the flags given for `name` and its ancestors into the settings overlay
    fn bind_flags(&mut self, name: &TaskName, matches: &ArgMatches) -> Result<()> {
        let mut bindings = Vec::new();
        let mut current = Some(name.clone());
        while let Some(task_name) = current {
            if let Some(task) = self.app.registry.find_task(&task_name) {
                for input in &task.resolved_inputs {
                    let value = matches
                        .try_get_one::<String>(&input.flag_name())
                        .ok()
                        .flatten();
                    if let Some(value) = value {
                        bindings.push((flag_key(&task_name, input), value.clone()));
                    }
                }
            }
            current = task_name.parent().ok();
        }

        let settings = self.app.settings_mut();
        for (key, value) in bindings.into_iter().rev() {
            debug!(key = %key, "binding flag");
            settings.set_flag(&key, Value::String(value))?;
        }
        Ok(())
    }

    fn run_env(&self, matches: &ArgMatches) -> Result<Option<String>> {
        match matches.subcommand() {
            Some((_, set)) => {
                let name = set
                    .get_one::<String>("name")
                    .ok_or_else(|| VariantError::Internal("missing environment name".to_string()))?;
                write_environment(&env::current_dir()?, &self.app.name, name)?;
                info!("switched to environment {}", name);
                Ok(None)
            }
            None => Ok(self.app.environment().map(str::to_string)),
        }
    }
}

/// Config key a flag value is bound at, as looked up for `task`
fn flag_key(task: &TaskName, input: &ResolvedInput) -> String {
    let short = input.short_name();
    let task_short = task.short();
    if short.ends_with(&task_short) {
        short
    } else {
        format!("{}.{}", task_short, short)
    }
}

fn input_arg(input: &ResolvedInput, persistent: bool) -> Arg {
    let flag = input.flag_name();
    let mut arg = Arg::new(flag.clone())
        .long(flag)
        .help(input.config.description.clone())
        .global(persistent);
    if input.config.input_type() == InputType::Boolean {
        arg = arg
            .num_args(0..=1)
            .require_equals(true)
            .default_missing_value("true");
    } else {
        arg = arg.value_name(input.config.input_type().as_str().to_uppercase());
    }
    arg
}

fn positional_help(task: &Task) -> String {
    let mut names: Vec<(usize, &str)> = task
        .inputs()
        .iter()
        .filter_map(|input| input.argument_index.map(|i| (i, input.name.as_str())))
        .collect();
    names.sort();
    if names.is_empty() {
        return "Positional arguments".to_string();
    }
    let names: Vec<&str> = names.into_iter().map(|(_, name)| name).collect();
    format!("Positional arguments: {}", names.join(" "))
}

fn global_args() -> Vec<Arg> {
    let flag = |name: &'static str, help: &'static str| {
        Arg::new(name)
            .long(name)
            .help(help)
            .action(ArgAction::SetTrue)
            .global(true)
    };
    let option = |name: &'static str, value: &'static str, help: &'static str| {
        Arg::new(name)
            .long(name)
            .value_name(value)
            .help(help)
            .global(true)
    };

    vec![
        Arg::new("file")
            .short('f')
            .long("file")
            .value_name("FILE")
            .help("Path to the Taskfile")
            .global(true),
        flag("verbose", "Print debug logs"),
        option("output", "FORMAT", "Log format")
            .value_parser(PossibleValuesParser::new(OUTPUT_FORMATS.iter().copied())),
        flag("color", "Force colored logs").conflicts_with("no-color"),
        flag("no-color", "Disable colored logs"),
        option("config-file", "FILE", "Config file replacing <app>.yaml"),
        option("config-context", "NAME", "Merge config/contexts/<NAME>.yaml")
            .action(ArgAction::Append),
        option("config-dir", "DIR", "Directory to read config files from")
            .action(ArgAction::Append),
        flag("logtostderr", "Write logs to stderr"),
        option("log-level", "LEVEL", "Log level filter"),
        option("color-error", "COLOR", "Color of error logs"),
        option("color-warn", "COLOR", "Color of warning logs"),
        option("color-info", "COLOR", "Color of info logs"),
        option("color-debug", "COLOR", "Color of debug logs"),
    ]
}

fn env_command() -> Command {
    Command::new(ENV_COMMAND)
        .about("Print the selected environment")
        .subcommand(
            Command::new("set")
                .visible_aliases(["switch", "use"])
                .about("Select the environment for this directory")
                .arg(Arg::new("name").value_name("NAME").required(true)),
        )
}

fn completion_command() -> Command {
    Command::new(COMPLETION_COMMAND)
        .about("Generate shell completion scripts")
        .arg(
            Arg::new("shell")
                .value_name("SHELL")
                .required(true)
                .value_parser(value_parser!(Shell)),
        )
}

fn complete(command: &mut Command, matches: &ArgMatches) -> Result<Option<String>> {
    let shell = *matches
        .get_one::<Shell>("shell")
        .ok_or_else(|| VariantError::Internal("missing shell".to_string()))?;
    let name = command.get_name().to_string();
    clap_complete::generate(shell, command, name, &mut io::stdout());
    Ok(None)
}

fn log_options(matches: &ArgMatches) -> Result<LogOptions> {
    let color = if matches.get_flag("no-color") {
        Some(false)
    } else if matches.get_flag("color") {
        Some(true)
    } else {
        None
    };

    let defaults = LevelColors::default();
    let colors = LevelColors {
        error: level_color(matches, "color-error", defaults.error)?,
        warn: level_color(matches, "color-warn", defaults.warn)?,
        info: level_color(matches, "color-info", defaults.info)?,
        debug: level_color(matches, "color-debug", defaults.debug)?,
    };

    Ok(LogOptions {
        level: matches.get_one::<String>("log-level").cloned(),
        verbose: matches.get_flag("verbose") || env_flag("VERBOSE"),
        output: matches
            .get_one::<String>("output")
            .and_then(|name| OutputFormat::parse(name))
            .unwrap_or_default(),
        color,
        to_stderr: matches.get_flag("logtostderr") || env_flag("LOGTOSTDERR"),
        colors,
    })
}

fn level_color(
    matches: &ArgMatches,
    id: &str,
    default: colored::Color,
) -> Result<colored::Color> {
    match matches.get_one::<String>(id) {
        Some(name) => logging::parse_color(name)
            .ok_or_else(|| ConfigError::Invalid(format!("--{}: unknown color '{}'", id, name)).into()),
        None => Ok(default),
    }
}

fn settings_sources(matches: &ArgMatches, environment: Option<&str>) -> SettingsSources {
    let strings = |id: &str| -> Vec<String> {
        matches
            .get_many::<String>(id)
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    };
    SettingsSources {
        config_file: matches.get_one::<String>("config-file").map(PathBuf::from),
        config_dirs: strings("config-dir").into_iter().map(PathBuf::from).collect(),
        contexts: strings("config-context"),
        environment: environment.map(str::to_string),
        user_config: true,
        taskfile: None,
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "t" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Run the CLI application with the process arguments
pub fn run() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(ConfigError::Invalid(format!(".env: {}", e)).into());
        }
    }

    let mut args: Vec<String> = env::args().collect();
    args.extend(args_from_env()?);

    let cli = Cli::load(&args)?;
    if let Some(output) = cli.run(&args)? {
        println!("{}", output);
    }
    Ok(())
}

/// Extract --file argument before clap parsing
fn extract_file_arg(args: &[String]) -> Option<PathBuf> {
    for i in 0..args.len() {
        if (args[i] == "--file" || args[i] == "-f") && i + 1 < args.len() {
            return Some(PathBuf::from(&args[i + 1]));
        }
        if let Some(path) = args[i].strip_prefix("--file=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputConfig;

    const TASKFILE: &str = r#"
tasks:
  deploy:
    inputs:
      - name: region
    tasks:
      web:
        inputs:
          - name: replicas
            type: integer
            argument-index: 0
          - name: dry-run
            type: boolean
            default: false
        script: echo {{.replicas}}
"#;

    fn cli() -> Cli {
        Cli::new(Application::from_yaml("app", TASKFILE, Settings::new("app")).unwrap())
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_file_arg() {
        let path = extract_file_arg(&args(&["variant", "--file", "test.yaml"]));
        assert_eq!(path, Some(PathBuf::from("test.yaml")));
    }

    #[test]
    fn test_extract_file_arg_short() {
        let path = extract_file_arg(&args(&["variant", "-f", "test.yaml"]));
        assert_eq!(path, Some(PathBuf::from("test.yaml")));
    }

    #[test]
    fn test_extract_file_arg_equals() {
        let path = extract_file_arg(&args(&["variant", "--file=test.yaml"]));
        assert_eq!(path, Some(PathBuf::from("test.yaml")));
    }

    #[test]
    fn test_command_tree() {
        let cmd = cli().command();
        let deploy = cmd.find_subcommand("deploy").unwrap();
        assert!(deploy.get_arguments().any(|a| a.get_id() == "region" && a.is_global_set()));

        let web = deploy.find_subcommand("web").unwrap();
        let replicas = web.get_arguments().find(|a| a.get_id() == "replicas").unwrap();
        assert!(!replicas.is_global_set());
        assert!(web.get_arguments().any(|a| a.get_id() == ARGS_ID));

        assert!(cmd.find_subcommand("env").is_some());
        assert!(cmd.find_subcommand("completion").is_some());
    }

    #[test]
    fn test_boolean_flag_without_value() {
        let matches = cli()
            .command()
            .try_get_matches_from(args(&["app", "deploy", "web", "--dry-run"]))
            .unwrap();
        let (_, deploy) = matches.subcommand().unwrap();
        let (_, web) = deploy.subcommand().unwrap();
        assert_eq!(web.get_one::<String>("dry-run").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_persistent_flag_reaches_leaf() {
        let matches = cli()
            .command()
            .try_get_matches_from(args(&["app", "deploy", "--region=eu", "web", "3"]))
            .unwrap();
        let (_, deploy) = matches.subcommand().unwrap();
        let (_, web) = deploy.subcommand().unwrap();
        assert_eq!(web.get_one::<String>("region").map(String::as_str), Some("eu"));
    }

    #[test]
    fn test_unknown_flag_is_usage_error() {
        let err = cli()
            .run(&args(&["app", "deploy", "web", "--nope"]))
            .unwrap_err();
        assert!(matches!(err, VariantError::Usage(_)));
    }

    #[test]
    fn test_builtin_shadowed_by_task() {
        let yaml = "tasks:\n  env:\n    script: echo hi\n";
        let cli = Cli::new(Application::from_yaml("app", yaml, Settings::new("app")).unwrap());
        let cmd = cli.command();
        assert_eq!(cmd.get_subcommands().filter(|c| c.get_name() == "env").count(), 1);
        assert!(cmd.find_subcommand("env").unwrap().find_subcommand("set").is_none());
    }

    #[test]
    fn test_flag_key() {
        let input = ResolvedInput {
            config: InputConfig::new("region"),
            task_key: TaskName::parse("app.deploy"),
            full_name: TaskName::parse("app.region"),
        };
        assert_eq!(flag_key(&TaskName::parse("app.deploy"), &input), "deploy.region");
        assert_eq!(flag_key(&TaskName::parse("app"), &input), "region");
    }

    #[test]
    fn test_function_task_output() {
        let mut cli = cli();
        cli.app_mut()
            .register_function(&["should", "succeed"], vec![InputConfig::new("input")], |ctx| {
                let input = ctx.string("input").unwrap_or_default();
                Ok(format!("{0}_{0}_{0}", input))
            })
            .unwrap();
        let output = cli
            .run(&args(&["app", "should", "succeed", "--input=SUCCEED"]))
            .unwrap();
        assert_eq!(output.as_deref(), Some("SUCCEED_SUCCEED_SUCCEED"));
    }
}
