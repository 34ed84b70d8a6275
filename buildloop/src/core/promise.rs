//! Detection of the `[[PROMISE:<TOKEN>]]` completion sentinel.
//!
//! The sentinel may appear anywhere in the accumulated transcript, including
//! inside multi-line text. Tokens are matched case-sensitively; whitespace
//! around the token is insignificant.

use std::sync::LazyLock;

use regex::Regex;

static PROMISE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[\[PROMISE:(.*?)\]\]").expect("promise regex is valid"));

/// Completion signal extracted from agent output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promise {
    /// One unit of work finished; the loop should continue.
    TaskComplete,
    /// All work finished; the loop should stop with success.
    BuildComplete,
}

impl Promise {
    pub fn as_str(&self) -> &'static str {
        match self {
            Promise::TaskComplete => "TASK_COMPLETE",
            Promise::BuildComplete => "BUILD_COMPLETE",
        }
    }
}

/// Scan `text` for the first sentinel carrying a known token.
///
/// Sentinels with unknown payloads are skipped. Returns `None` when no
/// recognized sentinel appears anywhere in the text.
pub fn detect(text: &str) -> Option<Promise> {
    for caps in PROMISE_RE.captures_iter(text) {
        match caps[1].trim() {
            "TASK_COMPLETE" => return Some(Promise::TaskComplete),
            "BUILD_COMPLETE" => return Some(Promise::BuildComplete),
            _ => {}
        }
    }
    None
}
