//! Pre-flight validation of run inputs.
//!
//! Runs before any process is spawned. Problems are collected into a list so
//! the operator sees every issue at once; paths are not rechecked mid-run.

use std::fs::File;
use std::path::Path;

use crate::runloop::RunConfig;

/// Strip the `@` path-prefix convention (`@docs/tasks.md` means
/// `docs/tasks.md` relative to the working directory).
pub fn normalize_path(path: &str) -> &str {
    path.strip_prefix('@').unwrap_or(path)
}

/// Check a run configuration. Returns an empty list when valid.
pub fn validate_run_config(config: &RunConfig) -> Vec<String> {
    let mut errors = Vec::new();
    check_readable_file("Tasks file", &config.tasks_file, &mut errors);
    for path in &config.context_files {
        check_readable_file("Context file", path, &mut errors);
    }
    if config.max_iterations == 0 {
        errors.push("Max iterations must be positive: 0".to_string());
    }
    errors
}

fn check_readable_file(label: &str, path: &Path, errors: &mut Vec<String>) {
    if !path.exists() {
        errors.push(format!("{label} not found: {}", path.display()));
    } else if !path.is_file() {
        errors.push(format!("{label} is not a file: {}", path.display()));
    } else if File::open(path).is_err() {
        errors.push(format!("{label} is not readable: {}", path.display()));
    }
}
