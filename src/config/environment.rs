//! Selected environment persisted in `.<app>env`

use crate::error::{ConfigError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Path of the environment file for `app` inside `dir`
pub fn environment_file(dir: &Path, app: &str) -> PathBuf {
    dir.join(format!(".{}env", app))
}

/// The environment selected in `dir`, if any
pub fn read_environment(dir: &Path, app: &str) -> Result<Option<String>> {
    let path = environment_file(dir, app);
    if !path.is_file() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path).map_err(|e| ConfigError::Read {
        path: path.clone(),
        error: e.to_string(),
    })?;
    let name = contents.trim();
    Ok((!name.is_empty()).then(|| name.to_string()))
}

/// Persist `name` as the environment selected in `dir`
pub fn write_environment(dir: &Path, app: &str, name: &str) -> Result<()> {
    let name = name.trim();
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(ConfigError::InvalidName(name.to_string()).into());
    }
    fs::write(environment_file(dir, app), format!("{}\n", name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(read_environment(temp_dir.path(), "app").unwrap(), None);

        write_environment(temp_dir.path(), "app", "dev").unwrap();
        assert!(temp_dir.path().join(".appenv").is_file());
        assert_eq!(
            read_environment(temp_dir.path(), "app").unwrap(),
            Some("dev".to_string())
        );
    }

    #[test]
    fn test_rejects_paths() {
        let temp_dir = TempDir::new().unwrap();
        assert!(write_environment(temp_dir.path(), "app", "../prod").is_err());
    }
}
