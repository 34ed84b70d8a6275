//! Resolution of the agent executable from priority-ordered sources.
//!
//! Lookup order: explicit override (config or `BUILDLOOP_AGENT` env var),
//! then a project-local `.buildloop/bin/` directory, then the bare name for
//! a PATH lookup by the OS. Independent of the iteration loop; the
//! supervisor just consumes the answer.

use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Default agent executable name, resolved on PATH.
pub const AGENT_PROGRAM: &str = "claude";

/// Environment variable overriding the agent executable.
pub const AGENT_ENV: &str = "BUILDLOOP_AGENT";

/// Resolve the agent executable for a run rooted at `cwd`.
///
/// `override_program` (from config or CLI) wins over the environment.
pub fn resolve_agent_program(cwd: &Path, override_program: Option<&str>) -> PathBuf {
    let env_override = env::var(AGENT_ENV).ok();
    resolve_from(cwd, override_program, env_override.as_deref())
}

fn resolve_from(cwd: &Path, override_program: Option<&str>, env_override: Option<&str>) -> PathBuf {
    if let Some(program) = override_program.filter(|p| !p.trim().is_empty()) {
        debug!(program, "agent program from config override");
        return PathBuf::from(program);
    }
    if let Some(program) = env_override.filter(|p| !p.trim().is_empty()) {
        debug!(program, "agent program from {AGENT_ENV}");
        return PathBuf::from(program);
    }
    let project_local = cwd.join(".buildloop").join("bin").join(AGENT_PROGRAM);
    if project_local.is_file() {
        debug!(path = %project_local.display(), "agent program from project bin");
        return project_local;
    }
    PathBuf::from(AGENT_PROGRAM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_override_wins_over_env() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resolved = resolve_from(temp.path(), Some("/opt/agent"), Some("/env/agent"));
        assert_eq!(resolved, PathBuf::from("/opt/agent"));
    }

    #[test]
    fn env_override_wins_over_project_bin() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bin = temp.path().join(".buildloop/bin");
        std::fs::create_dir_all(&bin).expect("mkdir");
        std::fs::write(bin.join(AGENT_PROGRAM), "#!/bin/sh\n").expect("write");

        let resolved = resolve_from(temp.path(), None, Some("/env/agent"));
        assert_eq!(resolved, PathBuf::from("/env/agent"));
    }

    #[test]
    fn project_bin_wins_over_path_lookup() {
        let temp = tempfile::tempdir().expect("tempdir");
        let bin = temp.path().join(".buildloop/bin");
        std::fs::create_dir_all(&bin).expect("mkdir");
        std::fs::write(bin.join(AGENT_PROGRAM), "#!/bin/sh\n").expect("write");

        let resolved = resolve_from(temp.path(), None, None);
        assert_eq!(resolved, bin.join(AGENT_PROGRAM));
    }

    #[test]
    fn falls_back_to_bare_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resolved = resolve_from(temp.path(), None, None);
        assert_eq!(resolved, PathBuf::from(AGENT_PROGRAM));
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resolved = resolve_from(temp.path(), Some("  "), Some(""));
        assert_eq!(resolved, PathBuf::from(AGENT_PROGRAM));
    }
}
