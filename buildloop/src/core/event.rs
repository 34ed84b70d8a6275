//! Decoding of the agent's line-delimited stream-JSON output.
//!
//! Each stdout line is turned into zero or more typed [`Event`]s. Decoding is
//! total: a line that is not well-formed stream-JSON decodes to a single
//! [`Event::Unrecognized`] carrying the raw text, so a completion sentinel
//! emitted as bare text is still seen by the promise detector. Recognized
//! protocol lines outside the assistant channel (system banners, tool
//! results) carry no content for the driver and decode to no events.

use serde::Deserialize;
use serde_json::Value;

/// One typed event from the agent's output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A text block from an assistant message.
    AssistantText(String),
    /// A tool call declared by the assistant.
    ToolInvocation { name: String, arguments: Value },
    /// Token accounting attached to an assistant message.
    UsageReport {
        input_tokens: u64,
        output_tokens: u64,
        cache_read_tokens: u64,
        cache_write_tokens: u64,
    },
    /// A line that was not well-formed stream-JSON, passed through verbatim.
    Unrecognized(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Assistant { message: WireMessage },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Vec<WireBlock>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}

/// Decode one raw output line into typed events. Never fails.
pub fn decode(line: &str) -> Vec<Event> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }

    let wire: WireEvent = match serde_json::from_str(line) {
        Ok(wire) => wire,
        Err(_) => return vec![Event::Unrecognized(line.to_string())],
    };

    let message = match wire {
        WireEvent::Assistant { message } => message,
        WireEvent::Other => return Vec::new(),
    };

    let mut events = Vec::new();
    if let Some(usage) = message.usage {
        events.push(Event::UsageReport {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cache_read_tokens: usage.cache_read_input_tokens,
            cache_write_tokens: usage.cache_creation_input_tokens,
        });
    }
    for block in message.content {
        match block {
            WireBlock::Text { text } => {
                if !text.trim().is_empty() {
                    events.push(Event::AssistantText(text));
                }
            }
            WireBlock::ToolUse { name, input } => {
                events.push(Event::ToolInvocation {
                    name,
                    arguments: input,
                });
            }
            WireBlock::Other => {}
        }
    }
    events
}

const DISPLAY_DETAIL_MAX: usize = 72;

/// Render an event as a single operator-facing line, or `None` for events
/// that have no display form (usage reports).
pub fn display_line(event: &Event) -> Option<String> {
    match event {
        Event::AssistantText(text) => Some(text.trim_end().to_string()),
        Event::ToolInvocation { name, arguments } => {
            let detail = tool_detail(name, arguments);
            if detail.is_empty() {
                Some(format!("[tool] {name}"))
            } else {
                Some(format!("[tool] {name}: {detail}"))
            }
        }
        Event::UsageReport { .. } => None,
        Event::Unrecognized(line) => Some(line.clone()),
    }
}

fn tool_detail(name: &str, arguments: &Value) -> String {
    let key = match name {
        "Read" | "Write" | "Edit" => "file_path",
        "Bash" => "command",
        "Glob" | "Grep" => "pattern",
        _ => return String::new(),
    };
    let detail = arguments.get(key).and_then(Value::as_str).unwrap_or("?");
    truncate_detail(detail)
}

fn truncate_detail(detail: &str) -> String {
    let detail = detail.replace('\n', " ");
    if detail.chars().count() <= DISPLAY_DETAIL_MAX {
        return detail;
    }
    let head: String = detail.chars().take(DISPLAY_DETAIL_MAX - 3).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Verifies an assistant message decodes into usage, text, and tool events.
    #[test]
    fn decode_assistant_message_yields_typed_events() {
        let line = json!({
            "type": "assistant",
            "message": {
                "content": [
                    {"type": "text", "text": "working on it"},
                    {"type": "tool_use", "name": "Bash", "input": {"command": "cargo test"}}
                ],
                "usage": {
                    "input_tokens": 10,
                    "output_tokens": 20,
                    "cache_read_input_tokens": 30,
                    "cache_creation_input_tokens": 40
                }
            }
        })
        .to_string();

        let events = decode(&line);
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            Event::UsageReport {
                input_tokens: 10,
                output_tokens: 20,
                cache_read_tokens: 30,
                cache_write_tokens: 40,
            }
        );
        assert_eq!(events[1], Event::AssistantText("working on it".to_string()));
        assert_eq!(
            events[2],
            Event::ToolInvocation {
                name: "Bash".to_string(),
                arguments: json!({"command": "cargo test"}),
            }
        );
    }

    /// Verifies decoding is total: malformed lines come back verbatim.
    #[test]
    fn decode_malformed_line_is_unrecognized() {
        let events = decode("not json at all [[PROMISE:TASK_COMPLETE]]");
        assert_eq!(
            events,
            vec![Event::Unrecognized(
                "not json at all [[PROMISE:TASK_COMPLETE]]".to_string()
            )]
        );
    }

    /// Protocol lines outside the assistant channel carry no events.
    #[test]
    fn decode_skips_system_and_result_lines() {
        let system = json!({"type": "system", "subtype": "init"}).to_string();
        let result = json!({"type": "result", "is_error": false}).to_string();
        assert!(decode(&system).is_empty());
        assert!(decode(&result).is_empty());
        assert!(decode("").is_empty());
        assert!(decode("   ").is_empty());
    }

    /// Blank text blocks are dropped; unknown content blocks are tolerated.
    #[test]
    fn decode_drops_blank_text_and_unknown_blocks() {
        let line = json!({
            "type": "assistant",
            "message": {
                "content": [
                    {"type": "text", "text": "  \n"},
                    {"type": "thinking", "thinking": "hmm"}
                ]
            }
        })
        .to_string();
        assert!(decode(&line).is_empty());
    }

    #[test]
    fn display_line_formats_known_tools() {
        let event = Event::ToolInvocation {
            name: "Read".to_string(),
            arguments: json!({"file_path": "/tmp/tasks.md"}),
        };
        assert_eq!(
            display_line(&event).as_deref(),
            Some("[tool] Read: /tmp/tasks.md")
        );

        let event = Event::ToolInvocation {
            name: "TodoWrite".to_string(),
            arguments: json!({}),
        };
        assert_eq!(display_line(&event).as_deref(), Some("[tool] TodoWrite"));
    }

    #[test]
    fn display_line_truncates_long_commands() {
        let event = Event::ToolInvocation {
            name: "Bash".to_string(),
            arguments: json!({"command": "x".repeat(200)}),
        };
        let line = display_line(&event).expect("display");
        assert!(line.len() < 100);
        assert!(line.ends_with("..."));
    }

    #[test]
    fn display_line_hides_usage_reports() {
        let event = Event::UsageReport {
            input_tokens: 1,
            output_tokens: 1,
            cache_read_tokens: 0,
            cache_write_tokens: 0,
        };
        assert!(display_line(&event).is_none());
    }
}
