//! Layered configuration values
//!
//! Inputs that are not passed on the command line are looked up here by
//! dotted key. Lookups consult, in order: values bound from CLI flags (kept
//! under the `flags.` namespace), `<APP>_<KEY>` environment variables, and the
//! merged tree of YAML config files.

use crate::error::{ConfigError, Result, VariantError};
use crate::utils::{
    cast_keys_to_strings, deep_merge, get_value_at_path, set_value_at_path, split_path, RUN_ENV,
};
use directories::ProjectDirs;
use serde_json::{Map, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Namespace of values bound from command line flags
pub const FLAGS_NAMESPACE: &str = "flags";

/// Where config files are looked up
#[derive(Debug, Clone, Default)]
pub struct SettingsSources {
    /// Replaces `<dir>/<app>.yaml` when set
    pub config_file: Option<PathBuf>,

    /// Directories searched in order; `.` when empty
    pub config_dirs: Vec<PathBuf>,

    /// Extra `config/contexts/<name>.yaml` files merged last
    pub contexts: Vec<String>,

    /// Selected environment, merging `config/environments/<env>.yaml`
    pub environment: Option<String>,

    /// Also read `<app>.yaml` from the user's config directory
    pub user_config: bool,

    /// The loaded Taskfile, never read as a config file
    pub taskfile: Option<PathBuf>,
}

/// Configuration values for one application
#[derive(Debug, Clone)]
pub struct Settings {
    base: Value,
    flags: Map<String, Value>,
    env_prefix: String,
}

impl Settings {
    /// Empty settings for `app`
    pub fn new(app: &str) -> Self {
        Settings::from_value(app, Value::Object(Map::new()))
    }

    /// Settings backed by an in-memory tree
    pub fn from_value(app: &str, base: Value) -> Self {
        Settings {
            base,
            flags: Map::new(),
            env_prefix: format!("{}_", env_key(app)),
        }
    }

    /// Load and merge every config file named by `sources`
    pub fn load(app: &str, sources: &SettingsSources) -> Result<Self> {
        let taskfile = sources.taskfile.as_deref().and_then(|p| p.canonicalize().ok());
        let mut base = Value::Object(Map::new());
        for path in config_files(app, sources) {
            if !path.is_file() {
                debug!(path = %path.display(), "config file not found, skipping");
                continue;
            }
            if taskfile.is_some() && path.canonicalize().ok() == taskfile {
                debug!(path = %path.display(), "config file is the Taskfile, skipping");
                continue;
            }
            debug!(path = %path.display(), "loading config file");
            deep_merge(&mut base, read_config_file(&path)?);
        }
        Ok(Settings::from_value(app, base))
    }

    /// Bind a command line value at `flags.<key>`
    pub fn set_flag(&mut self, key: &str, value: Value) -> Result<()> {
        set_value_at_path(&mut self.flags, &split_path(key), value)?;
        Ok(())
    }

    /// The raw value for `key`, or `None` when no layer defines it
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = split_path(key);
        if path.is_empty() {
            return Ok(None);
        }

        let flags = Value::Object(self.flags.clone());
        if let Some(value) = get_value_at_path(&flags, &path)? {
            return scalar(key, value, FLAGS_NAMESPACE);
        }

        let var = format!("{}{}", self.env_prefix, env_key(key));
        if !var.starts_with(RUN_ENV) {
            if let Ok(value) = env::var(&var) {
                return Ok(Some(Value::String(value)));
            }
        }

        match get_value_at_path(&self.base, &path)? {
            Some(value) => scalar(key, value, "config"),
            None => Ok(None),
        }
    }
}

fn scalar(key: &str, value: &Value, layer: &str) -> Result<Option<Value>> {
    match value {
        Value::Null => Ok(None),
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(Some(value.clone())),
        other => Err(VariantError::Internal(format!(
            "{} value {} for {} key '{}'",
            kind_of(other),
            other,
            layer,
            key
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Array(_) => "array",
        Value::Object(_) => "map",
        _ => "scalar",
    }
}

/// Environment variable form of a dotted key
pub fn env_key(key: &str) -> String {
    key.replace(['.', '-'], "_").to_uppercase()
}

fn config_files(app: &str, sources: &SettingsSources) -> Vec<PathBuf> {
    let file_name = format!("{}.yaml", app);
    let mut files = Vec::new();

    if sources.user_config {
        if let Some(dirs) = ProjectDirs::from("", "", app) {
            files.push(dirs.config_dir().join(&file_name));
        }
    }

    let dirs = if sources.config_dirs.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        sources.config_dirs.clone()
    };

    match &sources.config_file {
        Some(path) => files.push(path.clone()),
        None => files.extend(dirs.iter().map(|dir| dir.join(&file_name))),
    }

    if let Some(environment) = &sources.environment {
        for dir in &dirs {
            files.push(
                dir.join("config")
                    .join("environments")
                    .join(format!("{}.yaml", environment)),
            );
        }
    }

    for context in &sources.contexts {
        for dir in &dirs {
            files.push(dir.join("config").join("contexts").join(format!("{}.yaml", context)));
        }
    }

    files
}

fn read_config_file(path: &Path) -> Result<Value> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    let yaml: serde_yaml::Value = serde_yaml::from_str(&contents)?;
    match cast_keys_to_strings(yaml)? {
        Value::Null => Ok(Value::Object(Map::new())),
        value @ Value::Object(_) => Ok(value),
        _ => Err(ConfigError::Invalid(format!("{} is not a mapping", path.display())).into()),
    }
}
