//! Session record storage for `buildloop resume`.
//!
//! The record is the only state that crosses process boundaries: a snapshot
//! of the run parameters written at run start and refreshed on resume.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Session file location relative to the working directory.
pub const SESSION_FILE: &str = ".buildloop/session.json";

/// Persisted mirror of the run parameters (`.buildloop/session.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    pub tasks_file: PathBuf,
    #[serde(default)]
    pub context_files: Vec<PathBuf>,
    pub max_iterations: u32,
    /// RFC 3339 UTC timestamp of the last start.
    pub started_at: String,
    pub cwd: PathBuf,
}

impl SessionRecord {
    /// Snapshot the given run parameters with a fresh timestamp.
    pub fn new(
        tasks_file: PathBuf,
        context_files: Vec<PathBuf>,
        max_iterations: u32,
        cwd: PathBuf,
    ) -> Self {
        Self {
            tasks_file,
            context_files,
            max_iterations,
            started_at: Utc::now().to_rfc3339(),
            cwd,
        }
    }

    /// Multi-line description for the resume confirmation prompt.
    pub fn describe(&self) -> String {
        let mut lines = vec![format!("  Tasks:      {}", self.tasks_file.display())];
        if self.context_files.is_empty() {
            lines.push("  Context:    (none)".to_string());
        } else {
            for (i, path) in self.context_files.iter().enumerate() {
                let prefix = if i == 0 { "  Context:   " } else { "             " };
                lines.push(format!("{prefix} {}", path.display()));
            }
        }
        lines.push(format!("  Max iter:   {}", self.max_iterations));
        lines.push(format!("  Last run:   {}", self.started_at));
        lines.join("\n")
    }
}

pub fn session_path(cwd: &Path) -> PathBuf {
    cwd.join(SESSION_FILE)
}

/// Load the saved session, if any.
///
/// Returns `None` when the file is missing or unreadable as a session
/// record; a stale or corrupt session is never a reason to fail a fresh run.
pub fn load_session(cwd: &Path) -> Option<SessionRecord> {
    let path = session_path(cwd);
    let contents = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(record) => Some(record),
        Err(err) => {
            debug!(path = %path.display(), err = %err, "ignoring invalid session file");
            None
        }
    }
}

/// Atomically write the session record (temp file + rename).
pub fn save_session(cwd: &Path, record: &SessionRecord) -> Result<()> {
    let path = session_path(cwd);
    debug!(path = %path.display(), "writing session record");
    let mut buf = serde_json::to_string_pretty(record)?;
    buf.push('\n');
    write_atomic(&path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("session path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp session {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace session {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        SessionRecord {
            tasks_file: PathBuf::from("/work/tasks.md"),
            context_files: vec![PathBuf::from("/work/scope.md")],
            max_iterations: 10,
            started_at: "2026-08-28T12:00:00+00:00".to_string(),
            cwd: PathBuf::from("/work"),
        }
    }

    /// Verifies write then read preserves all fields.
    #[test]
    fn session_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let record = record();
        save_session(temp.path(), &record).expect("save");
        let loaded = load_session(temp.path()).expect("load");
        assert_eq!(loaded, record);
    }

    #[test]
    fn load_missing_session_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(load_session(temp.path()).is_none());
    }

    #[test]
    fn load_corrupt_session_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = session_path(temp.path());
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "{not json").expect("write");
        assert!(load_session(temp.path()).is_none());
    }

    #[test]
    fn describe_lists_parameters() {
        let description = record().describe();
        assert!(description.contains("/work/tasks.md"));
        assert!(description.contains("/work/scope.md"));
        assert!(description.contains("Max iter:   10"));
    }

    #[test]
    fn new_records_a_timestamp() {
        let record = SessionRecord::new(
            PathBuf::from("tasks.md"),
            Vec::new(),
            5,
            PathBuf::from("."),
        );
        assert!(record.started_at.contains('T'));
        assert!(record.context_files.is_empty());
    }
}
