//! Supervisor for one agent invocation.
//!
//! The [`AgentRunner`] trait decouples the iteration loop from the actual
//! agent backend (currently the `claude` CLI in print mode). Tests use
//! scripted runners that replay canned output without spawning processes.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::event::{Event, decode};
use crate::core::policy::CapabilityPolicy;
use crate::io::process::run_streaming;

/// Cap on captured agent stderr, kept for diagnostics only.
const STDERR_LIMIT_BYTES: usize = 100_000;

/// Parameters for a single agent invocation.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    /// Full instruction document fed to the agent's stdin.
    pub instructions: String,
    /// Optional wall-clock budget; expiry kills the agent.
    pub timeout: Option<Duration>,
}

/// Captured result of a finished invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub exit_code: i32,
    /// Assistant text plus unrecognized raw lines, in arrival order. This is
    /// the buffer the promise detector scans.
    pub transcript: String,
    pub stderr: String,
}

/// The agent executable could not be located.
#[derive(Debug)]
pub struct AgentNotFoundError {
    pub program: String,
}

impl fmt::Display for AgentNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "agent executable '{}' not found (is it installed and on PATH?)",
            self.program
        )
    }
}

impl std::error::Error for AgentNotFoundError {}

/// The invocation exceeded its timeout and the agent was killed.
#[derive(Debug)]
pub struct AgentTimedOutError {
    pub timeout: Duration,
    /// Output collected before the kill. Diagnostics only; must never be
    /// trusted as a completion signal.
    pub partial_transcript: String,
}

impl fmt::Display for AgentTimedOutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent timed out after {:?}", self.timeout)
    }
}

impl std::error::Error for AgentTimedOutError {}

/// Abstraction over agent execution backends.
pub trait AgentRunner {
    /// Run the agent once. Decoded events are forwarded to `on_event` as
    /// they arrive; the returned transcript holds the text the promise
    /// detector must scan.
    fn invoke(
        &self,
        request: &InvokeRequest,
        on_event: &mut dyn FnMut(&Event),
    ) -> Result<Invocation>;
}

/// Runner that spawns the `claude` CLI in non-interactive print mode.
pub struct ClaudeAgent {
    program: PathBuf,
    policy: CapabilityPolicy,
}

impl ClaudeAgent {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            policy: CapabilityPolicy::default(),
        }
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

impl AgentRunner for ClaudeAgent {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.map(|t| t.as_secs())))]
    fn invoke(
        &self,
        request: &InvokeRequest,
        on_event: &mut dyn FnMut(&Event),
    ) -> Result<Invocation> {
        info!(program = %self.program.display(), "starting agent invocation");

        // Fixed argument surface: print mode, capability allow/deny lists,
        // line-delimited JSON output. Never varies per call.
        let mut cmd = Command::new(&self.program);
        cmd.arg("-p")
            .arg("--allowedTools")
            .arg(self.policy.allow_list())
            .arg("--disallowedTools")
            .arg(self.policy.deny_list())
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose");

        let mut transcript = String::new();
        let output = {
            let mut on_line = |line: &str| consume_line(line, &mut transcript, on_event);
            run_streaming(
                cmd,
                request.instructions.as_bytes(),
                request.timeout,
                STDERR_LIMIT_BYTES,
                &mut on_line,
            )
        };

        let output = match output {
            Ok(output) => output,
            Err(err) => {
                let not_found = err
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound);
                if not_found {
                    return Err(AgentNotFoundError {
                        program: self.program.display().to_string(),
                    }
                    .into());
                }
                return Err(err).context("run agent process");
            }
        };

        if output.timed_out {
            return Err(AgentTimedOutError {
                timeout: request.timeout.unwrap_or_default(),
                partial_transcript: transcript,
            }
            .into());
        }

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(exit_code, transcript_bytes = transcript.len(), "agent invocation finished");
        Ok(Invocation {
            exit_code,
            transcript,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Decode one stdout line, forward its events, and grow the detection
/// buffer. Unrecognized lines land in the buffer verbatim so a sentinel
/// emitted as bare text is still detectable.
pub(crate) fn consume_line(
    line: &str,
    transcript: &mut String,
    on_event: &mut dyn FnMut(&Event),
) {
    for event in decode(line) {
        match &event {
            Event::AssistantText(text) => {
                transcript.push_str(text);
                transcript.push('\n');
            }
            Event::Unrecognized(raw) => {
                transcript.push_str(raw);
                transcript.push('\n');
            }
            Event::ToolInvocation { .. } | Event::UsageReport { .. } => {}
        }
        on_event(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A missing executable maps to the typed not-found error.
    #[test]
    fn invoke_maps_missing_executable() {
        let agent = ClaudeAgent::new(PathBuf::from("no-such-agent-binary-4242"));
        let request = InvokeRequest {
            instructions: "hello".to_string(),
            timeout: Some(Duration::from_secs(5)),
        };

        let err = agent
            .invoke(&request, &mut |_| {})
            .expect_err("invoke should fail");
        let not_found = err
            .downcast_ref::<AgentNotFoundError>()
            .expect("typed not-found error");
        assert!(not_found.program.contains("no-such-agent-binary"));
    }

    /// End-to-end through a stand-in script: events stream, transcript
    /// accumulates assistant text, and the exit code is surfaced.
    #[test]
    fn invoke_streams_events_from_stand_in() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("fake-agent");
        let assistant = json!({
            "type": "assistant",
            "message": {
                "content": [{"type": "text", "text": "done [[PROMISE:TASK_COMPLETE]]"}],
                "usage": {"input_tokens": 5, "output_tokens": 2}
            }
        });
        std::fs::write(
            &script,
            format!("#!/bin/sh\ncat > /dev/null\necho '{assistant}'\nexit 0\n"),
        )
        .expect("write script");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
                .expect("chmod");
        }

        let agent = ClaudeAgent::new(script);
        let request = InvokeRequest {
            instructions: "go".to_string(),
            timeout: Some(Duration::from_secs(10)),
        };
        let mut events = Vec::new();
        let invocation = agent
            .invoke(&request, &mut |event| events.push(event.clone()))
            .expect("invoke");

        assert_eq!(invocation.exit_code, 0);
        assert!(invocation.transcript.contains("[[PROMISE:TASK_COMPLETE]]"));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, Event::UsageReport { input_tokens: 5, .. }))
        );
    }

    #[test]
    fn consume_line_buffers_unrecognized_text() {
        let mut transcript = String::new();
        let mut count = 0usize;
        consume_line(
            "bare sentinel [[PROMISE:BUILD_COMPLETE]]",
            &mut transcript,
            &mut |_| count += 1,
        );
        assert_eq!(count, 1);
        assert!(transcript.contains("[[PROMISE:BUILD_COMPLETE]]"));
    }
}
