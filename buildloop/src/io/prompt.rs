//! Instruction document rendering for each iteration.
//!
//! Pure template expansion: for fixed inputs the rendered document is
//! identical every iteration. Cross-iteration progress is carried by the
//! task-list file the agent mutates in place, never by the driver.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const ITERATION_TEMPLATE: &str = include_str!("prompts/iteration.md");

/// Derive the progress-file path: `build_progress.md` next to the tasks file.
pub fn progress_file_for(tasks_file: &Path) -> PathBuf {
    tasks_file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("build_progress.md")
}

/// Render the per-iteration instruction document.
pub fn render_instructions(tasks_file: &Path, context_files: &[PathBuf]) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("iteration", ITERATION_TEMPLATE)
        .context("iteration template should be valid")?;
    let template = env
        .get_template("iteration")
        .context("load iteration template")?;

    let context_paths: Vec<String> = context_files
        .iter()
        .map(|path| path.display().to_string())
        .collect();
    let rendered = template
        .render(context! {
            tasks_file => tasks_file.display().to_string(),
            progress_file => progress_file_for(tasks_file).display().to_string(),
            context_files => context_paths,
        })
        .context("render iteration instructions")?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_reference_all_paths() {
        let tasks = PathBuf::from("/work/docs/tasks.md");
        let contexts = vec![
            PathBuf::from("/work/docs/scope.md"),
            PathBuf::from("/work/docs/plan.md"),
        ];
        let rendered = render_instructions(&tasks, &contexts).expect("render");

        assert!(rendered.contains("`/work/docs/tasks.md`"));
        assert!(rendered.contains("`/work/docs/build_progress.md`"));
        assert!(rendered.contains("`/work/docs/scope.md`"));
        assert!(rendered.contains("`/work/docs/plan.md`"));
        assert!(rendered.contains("[[PROMISE:TASK_COMPLETE]]"));
        assert!(rendered.contains("[[PROMISE:BUILD_COMPLETE]]"));
    }

    #[test]
    fn instructions_without_context_say_none() {
        let tasks = PathBuf::from("/work/docs/tasks.md");
        let rendered = render_instructions(&tasks, &[]).expect("render");
        assert!(rendered.contains("Additional context: None"));
    }

    /// Rendering is pure: identical inputs yield identical documents.
    #[test]
    fn instructions_are_deterministic() {
        let tasks = PathBuf::from("tasks.md");
        let contexts = vec![PathBuf::from("scope.md")];
        let first = render_instructions(&tasks, &contexts).expect("render");
        let second = render_instructions(&tasks, &contexts).expect("render");
        assert_eq!(first, second);
    }

    #[test]
    fn progress_file_sits_next_to_tasks_file() {
        assert_eq!(
            progress_file_for(Path::new("/a/b/tasks.md")),
            PathBuf::from("/a/b/build_progress.md")
        );
        assert_eq!(
            progress_file_for(Path::new("tasks.md")),
            PathBuf::from("./build_progress.md")
        );
    }
}
