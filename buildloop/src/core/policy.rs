//! Fixed capability policy attached to every agent invocation.
//!
//! The allow/deny lists are the sole safety boundary the driver imposes:
//! allowed tools run without prompting, denied tools are blocked entirely so
//! the loop can never stall waiting for user input. Constant for the life of
//! the program.

/// Tools auto-approved for unattended execution.
const ALLOWED_TOOLS: &[&str] = &[
    "Bash", "Read", "Write", "Edit", "Glob", "Grep", "LS", "TodoRead", "TodoWrite",
];

/// Tools blocked entirely: these would block the loop or are unsafe to
/// automate (interactive prompts, network access, subagent spawning).
const DENIED_TOOLS: &[&str] = &[
    "AskUserQuestion",
    "WebFetch",
    "WebSearch",
    "Task",
    "Skill",
    "EnterPlanMode",
    "NotebookEdit",
];

/// Allow/deny capability lists handed to the agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityPolicy {
    pub allowed: &'static [&'static str],
    pub denied: &'static [&'static str],
}

impl Default for CapabilityPolicy {
    fn default() -> Self {
        Self {
            allowed: ALLOWED_TOOLS,
            denied: DENIED_TOOLS,
        }
    }
}

impl CapabilityPolicy {
    /// Comma-separated allow list for the agent's CLI surface.
    pub fn allow_list(&self) -> String {
        self.allowed.join(",")
    }

    /// Comma-separated deny list for the agent's CLI surface.
    pub fn deny_list(&self) -> String {
        self.denied.join(",")
    }
}
