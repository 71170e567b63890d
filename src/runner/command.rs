//! Script execution
//!
//! Scripts run through `bash -c` on the host, or through `docker run` when the
//! runner names an image. Unless the task is interactive, stdout and stderr are
//! drained by two scanner threads feeding one channel so lines reach their
//! sinks in the order they were read.

use crate::config::RunnerConfig;
use crate::error::{ExecutionError, Result, VariantError};
use crate::runner::ExecutionContext;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Stdout lines starting with this prefix are written to stderr instead
pub const STDERR_PREFIX: &str = "variant.stderr: ";

const DEFAULT_SHELL: &str = "bash";
const CONTAINER_RUNTIME: &str = "docker";

enum Line {
    Stdout(String),
    Stderr(String),
}

/// Run a rendered script and return its trimmed stdout
pub fn run_script(ctx: &ExecutionContext<'_>, script: &str, runner: &RunnerConfig) -> Result<String> {
    let mut command = if runner.image.is_empty() {
        host_command(ctx, script, runner)?
    } else {
        container_command(ctx, script, runner)
    };

    let program = command.get_program().to_string_lossy().into_owned();
    debug!(task = %ctx.key(), program = %program, container = !runner.image.is_empty(), "running script");

    if ctx.interactive() {
        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        let status = command.status().map_err(|e| spawn_error(&program, e))?;
        return finish(status, String::new(), String::new());
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn().map_err(|e| spawn_error(&program, e))?;

    let (tx, rx) = mpsc::channel();
    let scanners = [
        scan(child.stdout.take(), tx.clone(), Line::Stdout),
        scan(child.stderr.take(), tx, Line::Stderr),
    ];

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    for line in rx {
        match line {
            Line::Stdout(text) => match text.strip_prefix(STDERR_PREFIX) {
                Some(rerouted) => {
                    eprintln!("{}", rerouted);
                    stderr.push(rerouted.to_string());
                }
                None => {
                    if ctx.as_input() {
                        info!(task = %ctx.key(), "{}", text);
                    } else {
                        println!("{}", text);
                    }
                    stdout.push(text);
                }
            },
            Line::Stderr(text) => {
                eprintln!("{}", text);
                stderr.push(text);
            }
        }
    }

    for scanner in scanners.into_iter().flatten() {
        scanner
            .join()
            .map_err(|_| VariantError::Internal("panic in output scanner".to_string()))?;
    }
    let status = child.wait()?;
    finish(status, stdout.join("\n"), stderr.join("\n"))
}

fn finish(status: ExitStatus, stdout: String, stderr: String) -> Result<String> {
    if status.success() {
        Ok(stdout.trim().to_string())
    } else {
        Err(ExecutionError::ScriptFailed {
            code: status.code(),
            output: stderr.trim().to_string(),
        }
        .into())
    }
}

fn spawn_error(program: &str, error: std::io::Error) -> VariantError {
    ExecutionError::Spawn {
        program: program.to_string(),
        error: error.to_string(),
    }
    .into()
}

/// Forward each line read from `reader` until it closes
fn scan<R: Read + Send + 'static>(
    reader: Option<R>,
    tx: Sender<Line>,
    wrap: fn(String) -> Line,
) -> Option<JoinHandle<()>> {
    reader.map(|reader| {
        thread::spawn(move || {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end_matches(['\n', '\r']).to_string();
                        if tx.send(wrap(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!(error = %e, "output stream closed");
                        break;
                    }
                }
            }
        })
    })
}

fn host_command(ctx: &ExecutionContext<'_>, script: &str, runner: &RunnerConfig) -> Result<Command> {
    let shell = if runner.command.is_empty() {
        DEFAULT_SHELL
    } else {
        runner.command.as_str()
    };
    let mut command = Command::new(shell);
    if runner.args.is_empty() {
        command.arg("-c");
    } else {
        command.args(&runner.args);
    }
    command.arg(script);

    if !runner.envfile.is_empty() {
        let entries = dotenvy::from_path_iter(&runner.envfile).map_err(|e| {
            ExecutionError::Environment(format!("{}: {}", runner.envfile, e))
        })?;
        for entry in entries {
            let (key, value) = entry.map_err(|e| {
                ExecutionError::Environment(format!("{}: {}", runner.envfile, e))
            })?;
            command.env(key, value);
        }
    }
    if ctx.autoenv() {
        command.envs(ctx.generate_autoenv());
    }
    command.envs(&runner.env);

    if let Some(dir) = autodir(ctx) {
        debug!(dir = %dir.display(), "running in task directory");
        command.current_dir(dir);
    }
    if !runner.workdir.is_empty() {
        command.current_dir(&runner.workdir);
    }
    Ok(command)
}

fn container_command(ctx: &ExecutionContext<'_>, script: &str, runner: &RunnerConfig) -> Command {
    let mut command = Command::new(CONTAINER_RUNTIME);
    command.args(["run", "--rm", "-i"]);

    for (key, value) in &runner.env {
        command.arg("-e").arg(format!("{}={}", key, value));
    }
    if ctx.autoenv() {
        for (key, value) in ctx.generate_autoenv() {
            command.arg("-e").arg(format!("{}={}", key, value));
        }
    }
    if !runner.envfile.is_empty() {
        command.arg("--env-file").arg(&runner.envfile);
    }
    for volume in &runner.volumes {
        command.arg("-v").arg(volume);
    }
    if !runner.net.is_empty() {
        command.arg("--net").arg(&runner.net);
    }
    if !runner.workdir.is_empty() {
        command.arg("-w").arg(&runner.workdir);
    }
    if !runner.entrypoint.is_empty() {
        command.arg("--entrypoint").arg(&runner.entrypoint);
    }

    command.arg(&runner.image);
    if runner.entrypoint.is_empty() {
        command.arg(if runner.command.is_empty() {
            DEFAULT_SHELL
        } else {
            runner.command.as_str()
        });
    } else if !runner.command.is_empty() {
        command.arg(&runner.command);
    }
    if runner.args.is_empty() && runner.entrypoint.is_empty() {
        command.arg("-c");
    } else {
        command.args(&runner.args);
    }
    command.arg(script);
    command
}

/// Directory named after the task's parent, when it exists
fn autodir(ctx: &ExecutionContext<'_>) -> Option<PathBuf> {
    if !ctx.autodir() {
        return None;
    }
    let parent = ctx.key().parent().ok()?.short();
    if parent.is_empty() {
        return None;
    }
    let dir = PathBuf::from(parent.replace('.', "/"));
    dir.is_dir().then_some(dir)
}
