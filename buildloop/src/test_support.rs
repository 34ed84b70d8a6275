//! Scripted agent backends for tests.
//!
//! [`ScriptedAgent`] replays canned stdout lines through the same decoding
//! path as the real runner, without spawning a process. Each invocation
//! consumes one [`ScriptedInvocation`] from the front of the script.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;

use crate::core::event::Event;
use crate::io::agent::{
    AgentNotFoundError, AgentRunner, AgentTimedOutError, InvokeRequest, Invocation, consume_line,
};

/// How a scripted invocation ends after its lines have been replayed.
#[derive(Debug, Clone)]
pub enum ScriptedEnd {
    /// Process exits with this code.
    Exit(i32),
    /// Executable could not be found; no lines are replayed.
    NotFound,
    /// Invocation hits its timeout after the lines were emitted.
    TimeOut,
}

/// One canned invocation: stdout lines followed by an ending.
#[derive(Debug, Clone)]
pub struct ScriptedInvocation {
    pub lines: Vec<String>,
    pub end: ScriptedEnd,
}

/// Replays a fixed script, one entry per `invoke` call.
pub struct ScriptedAgent {
    script: RefCell<VecDeque<ScriptedInvocation>>,
}

impl ScriptedAgent {
    pub fn new(script: Vec<ScriptedInvocation>) -> Self {
        Self {
            script: RefCell::new(script.into()),
        }
    }

    /// Entries not yet consumed by an invocation.
    pub fn remaining(&self) -> usize {
        self.script.borrow().len()
    }
}

impl AgentRunner for ScriptedAgent {
    fn invoke(
        &self,
        _request: &InvokeRequest,
        on_event: &mut dyn FnMut(&Event),
    ) -> Result<Invocation> {
        let entry = self
            .script
            .borrow_mut()
            .pop_front()
            .expect("scripted agent invoked more times than scripted");

        if matches!(entry.end, ScriptedEnd::NotFound) {
            return Err(AgentNotFoundError {
                program: "scripted-agent".to_string(),
            }
            .into());
        }

        let mut transcript = String::new();
        for line in &entry.lines {
            consume_line(line, &mut transcript, on_event);
        }

        match entry.end {
            ScriptedEnd::Exit(code) => Ok(Invocation {
                exit_code: code,
                transcript,
                stderr: String::new(),
            }),
            ScriptedEnd::TimeOut => Err(AgentTimedOutError {
                timeout: Duration::from_secs(0),
                partial_transcript: transcript,
            }
            .into()),
            ScriptedEnd::NotFound => unreachable!("handled above"),
        }
    }
}

/// Wrap `text` in a minimal assistant message line.
pub fn assistant_line(text: &str) -> String {
    serde_json::json!({
        "type": "assistant",
        "message": {
            "content": [{"type": "text", "text": text}]
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_agent_replays_in_order() {
        let agent = ScriptedAgent::new(vec![
            ScriptedInvocation {
                lines: vec![assistant_line("first")],
                end: ScriptedEnd::Exit(0),
            },
            ScriptedInvocation {
                lines: vec![assistant_line("second")],
                end: ScriptedEnd::Exit(2),
            },
        ]);
        let request = InvokeRequest {
            instructions: String::new(),
            timeout: None,
        };

        let one = agent.invoke(&request, &mut |_| {}).expect("first");
        assert!(one.transcript.contains("first"));
        assert_eq!(one.exit_code, 0);

        let two = agent.invoke(&request, &mut |_| {}).expect("second");
        assert!(two.transcript.contains("second"));
        assert_eq!(two.exit_code, 2);
        assert_eq!(agent.remaining(), 0);
    }

    #[test]
    fn timeout_entry_surfaces_partial_transcript() {
        let agent = ScriptedAgent::new(vec![ScriptedInvocation {
            lines: vec![assistant_line("half done")],
            end: ScriptedEnd::TimeOut,
        }]);
        let request = InvokeRequest {
            instructions: String::new(),
            timeout: None,
        };

        let err = agent.invoke(&request, &mut |_| {}).expect_err("timeout");
        let timed_out = err
            .downcast_ref::<AgentTimedOutError>()
            .expect("typed timeout error");
        assert!(timed_out.partial_transcript.contains("half done"));
    }
}
