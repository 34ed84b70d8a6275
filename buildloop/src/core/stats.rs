//! Run-wide statistics aggregation.
//!
//! Token counters advance only on usage reports; tool-call counts only on
//! tool invocations. The aggregator is owned exclusively by the iteration
//! controller and rendered once on every terminal path, so an operator
//! always sees token/tool/iteration counts regardless of how the run ended.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::core::event::Event;

/// Performance rank derived from the completed/failed ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rank {
    SPlus,
    S,
    A,
    B,
    C,
    D,
    /// No iterations recorded yet.
    Unranked,
}

impl Rank {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::SPlus => "S+",
            Rank::S => "S",
            Rank::A => "A",
            Rank::B => "B",
            Rank::C => "C",
            Rank::D => "D",
            Rank::Unranked => "?",
        }
    }
}

/// Pure rank function of the two iteration counters.
///
/// A perfect ratio over at least five completions earns the top rank; a
/// perfect ratio over fewer earns the second. Below that, thresholds at
/// 0.9 / 0.7 / 0.5 descend through `A`/`B`/`C`, else `D`.
pub fn rank(completed: u32, failed: u32) -> Rank {
    let total = completed + failed;
    if total == 0 {
        return Rank::Unranked;
    }
    let ratio = f64::from(completed) / f64::from(total);
    if ratio >= 1.0 {
        if completed >= 5 { Rank::SPlus } else { Rank::S }
    } else if ratio >= 0.9 {
        Rank::A
    } else if ratio >= 0.7 {
        Rank::B
    } else if ratio >= 0.5 {
        Rank::C
    } else {
        Rank::D
    }
}

/// Counters accumulated across an entire run.
#[derive(Debug, Clone)]
pub struct RunStats {
    started: Instant,
    pub completed: u32,
    pub failed: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    tool_calls: BTreeMap<String, u64>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            completed: 0,
            failed: 0,
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
            cache_write_tokens: 0,
            tool_calls: BTreeMap::new(),
        }
    }

    /// Fold one decoded event into the counters.
    pub fn record(&mut self, event: &Event) {
        match event {
            Event::UsageReport {
                input_tokens,
                output_tokens,
                cache_read_tokens,
                cache_write_tokens,
            } => {
                self.input_tokens += input_tokens;
                self.output_tokens += output_tokens;
                self.cache_read_tokens += cache_read_tokens;
                self.cache_write_tokens += cache_write_tokens;
            }
            Event::ToolInvocation { name, .. } => {
                *self.tool_calls.entry(name.clone()).or_insert(0) += 1;
            }
            Event::AssistantText(_) | Event::Unrecognized(_) => {}
        }
    }

    pub fn record_completed(&mut self) {
        self.completed += 1;
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
    }

    pub fn total_tool_calls(&self) -> u64 {
        self.tool_calls.values().sum()
    }

    pub fn tool_calls(&self) -> &BTreeMap<String, u64> {
        &self.tool_calls
    }

    pub fn rank(&self) -> Rank {
        rank(self.completed, self.failed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed time formatted for display (`42s`, `1m 2s`, `1h 2m 3s`).
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed())
    }

    /// Render the end-of-run dashboard.
    pub fn render_summary(&self) -> String {
        let total_tokens = self.input_tokens + self.output_tokens;
        let mut lines = vec![
            "---- run summary ----".to_string(),
            format!("  time        {}", format_elapsed(self.elapsed())),
            format!(
                "  iterations  {} completed, {} failed",
                self.completed, self.failed
            ),
            format!(
                "  tokens      {} ({} in / {} out)",
                format_tokens(total_tokens),
                format_tokens(self.input_tokens),
                format_tokens(self.output_tokens)
            ),
            format!(
                "  cache       {} read / {} written",
                format_tokens(self.cache_read_tokens),
                format_tokens(self.cache_write_tokens)
            ),
        ];
        if self.tool_calls.is_empty() {
            lines.push(format!("  tools       {} calls", self.total_tool_calls()));
        } else {
            let breakdown: Vec<String> = self
                .tool_calls
                .iter()
                .map(|(name, count)| format!("{name} {count}"))
                .collect();
            lines.push(format!(
                "  tools       {} calls ({})",
                self.total_tool_calls(),
                breakdown.join(", ")
            ));
        }
        lines.push(format!("  rank        {}", self.rank().as_str()));
        lines.push("---------------------".to_string());
        lines.join("\n")
    }
}

/// Format a token count for display (`42`, `12,345`, or `1.3M`).
fn format_tokens(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        let digits = count.to_string();
        let mut grouped = String::new();
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        grouped
    } else {
        count.to_string()
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
