//! Common test utilities

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Create a temporary directory with a variant.yaml file
pub fn create_taskfile(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("variant.yaml");
    fs::write(&path, content).unwrap();
    (temp_dir, path)
}

/// Create a Taskfile in a directory with a nested subdirectory
pub fn create_taskfile_with_subdir(content: &str) -> (TempDir, PathBuf, PathBuf) {
    let (temp_dir, path) = create_taskfile(content);
    let sub_dir = temp_dir.path().join("subdir");
    fs::create_dir(&sub_dir).unwrap();
    (temp_dir, path, sub_dir)
}
