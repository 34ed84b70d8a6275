//! The iteration controller: a bounded invoke-decode-detect-decide loop.
//!
//! Each iteration renders the instruction document, invokes the agent once,
//! folds its decoded events into the run statistics, and scans the
//! accumulated transcript for a promise sentinel. Progress between
//! iterations is carried entirely by the task-list file the agent mutates in
//! place; the controller keeps no per-iteration memory beyond the
//! aggregated statistics.
//!
//! The loop is strictly sequential: at most one agent process is alive at
//! any time, and an iteration starts only after the previous process has
//! exited and its output has been fully drained. Concurrent iterations
//! would let two agents mutate the same task file at once.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::core::event::display_line;
use crate::core::promise::{Promise, detect};
use crate::core::stats::RunStats;
use crate::exit_codes;
use crate::io::agent::{
    AgentNotFoundError, AgentRunner, AgentTimedOutError, InvokeRequest, Invocation,
};
use crate::io::prompt::render_instructions;

/// Immutable parameters of one run, validated before the loop starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub tasks_file: PathBuf,
    pub context_files: Vec<PathBuf>,
    pub max_iterations: u32,
    /// Per-invocation budget. `None` disables timeout enforcement.
    pub timeout: Option<Duration>,
}

/// Everything one iteration produced. Consumed immediately; only the
/// aggregated statistics outlive the iteration.
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    /// 1-indexed iteration number.
    pub iteration: u32,
    pub exit_code: i32,
    pub promise: Option<Promise>,
    pub transcript: String,
    pub stderr: String,
}

/// Reason the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStop {
    /// The agent promised `BUILD_COMPLETE`.
    BuildComplete { iteration: u32 },
    /// The iteration cap was reached without `BUILD_COMPLETE`.
    Exhausted { max_iterations: u32 },
    /// The agent executable could not be located.
    AgentNotFound { program: String },
    /// An invocation exceeded its timeout and was killed.
    TimedOut { iteration: u32 },
    /// The agent exited non-zero without any promise.
    AgentFailed { iteration: u32, exit_code: i32 },
}

impl RunStop {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStop::BuildComplete { .. })
    }

    /// Process exit code for this stop reason.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStop::BuildComplete { .. } => exit_codes::OK,
            RunStop::Exhausted { .. } => exit_codes::EXHAUSTED,
            RunStop::AgentNotFound { .. } => exit_codes::AGENT_NOT_FOUND,
            RunStop::TimedOut { .. } => exit_codes::TIMEOUT,
            // The child's own exit code passes through.
            RunStop::AgentFailed { exit_code, .. } => *exit_code,
        }
    }
}

/// Summary of a finished run: why it stopped plus the accumulated counters.
#[derive(Debug)]
pub struct RunOutcome {
    pub stop: RunStop,
    pub stats: RunStats,
}

/// Drive the agent for up to `config.max_iterations` iterations.
///
/// `on_iteration` fires once per iteration that produced an agent exit
/// (fatal or not); invocations that never yielded a process result
/// (executable missing, timeout kill) do not report.
///
/// Returns `Err` only for driver-internal failures (e.g. template
/// rendering); every agent-level failure is a normal [`RunStop`].
pub fn run_loop<A: AgentRunner, F: FnMut(&IterationOutcome)>(
    config: &RunConfig,
    agent: &A,
    mut on_iteration: F,
) -> Result<RunOutcome> {
    let mut stats = RunStats::new();

    println!("--- Build Loop Configuration ---");
    println!("Tasks file:     {}", config.tasks_file.display());
    if config.context_files.is_empty() {
        println!("Context files:  (none)");
    } else {
        for path in &config.context_files {
            println!("Context file:   {}", path.display());
        }
    }
    println!("Max iterations: {}", config.max_iterations);
    println!("--------------------------------");

    for iteration in 1..=config.max_iterations {
        println!();
        println!("=== Iteration {iteration}/{} ===", config.max_iterations);
        println!("    one task done:  [[PROMISE:TASK_COMPLETE]]");
        println!("    all tasks done: [[PROMISE:BUILD_COMPLETE]]");
        info!(iteration, max_iterations = config.max_iterations, "starting iteration");

        // Logically identical every iteration; the agent carries progress
        // by mutating the tasks file in place.
        let instructions = render_instructions(&config.tasks_file, &config.context_files)?;
        let request = InvokeRequest {
            instructions,
            timeout: config.timeout,
        };

        let invocation = {
            let result = agent.invoke(&request, &mut |event| {
                stats.record(event);
                if let Some(line) = display_line(event) {
                    println!("{line}");
                }
            });
            match result {
                Ok(invocation) => invocation,
                Err(err) => {
                    if let Some(not_found) = err.downcast_ref::<AgentNotFoundError>() {
                        eprintln!("error: {not_found}");
                        return Ok(RunOutcome {
                            stop: RunStop::AgentNotFound {
                                program: not_found.program.clone(),
                            },
                            stats,
                        });
                    }
                    if let Some(timed_out) = err.downcast_ref::<AgentTimedOutError>() {
                        stats.record_failed();
                        eprintln!("error: {timed_out} (iteration {iteration})");
                        // Partial output is diagnostics only, never a
                        // completion signal.
                        debug!(
                            partial_bytes = timed_out.partial_transcript.len(),
                            "discarding partial transcript from timed-out iteration"
                        );
                        return Ok(RunOutcome {
                            stop: RunStop::TimedOut { iteration },
                            stats,
                        });
                    }
                    return Err(err);
                }
            }
        };

        let promise = detect(&invocation.transcript);
        let outcome = iteration_outcome(iteration, &invocation, promise);
        on_iteration(&outcome);

        if invocation.exit_code != 0 {
            if promise.is_some() {
                // The agent is trusted over the process exit code.
                warn!(
                    exit_code = invocation.exit_code,
                    "agent exited non-zero but promised completion"
                );
                println!(
                    "warning: agent exited with code {} but the task completed",
                    invocation.exit_code
                );
            } else {
                stats.record_failed();
                eprintln!(
                    "error: agent exited with code {} and no promise (iteration {iteration})",
                    invocation.exit_code
                );
                if !invocation.stderr.trim().is_empty() {
                    eprintln!("{}", invocation.stderr.trim_end());
                }
                return Ok(RunOutcome {
                    stop: RunStop::AgentFailed {
                        iteration,
                        exit_code: invocation.exit_code,
                    },
                    stats,
                });
            }
        }

        match promise {
            Some(Promise::BuildComplete) => {
                stats.record_completed();
                println!();
                println!("BUILD COMPLETE - all tasks finished.");
                return Ok(RunOutcome {
                    stop: RunStop::BuildComplete { iteration },
                    stats,
                });
            }
            Some(Promise::TaskComplete) => {
                stats.record_completed();
                println!();
                println!("Task complete. Continuing to next iteration.");
            }
            None => {
                // The agent may still be mid-task or forgot to signal;
                // neither counter moves and the loop continues.
                warn!(iteration, "no promise detected in agent output");
                println!();
                println!("No promise detected. Continuing to next iteration.");
            }
        }
    }

    println!();
    println!(
        "Max iterations ({}) reached. Build incomplete; review the tasks file.",
        config.max_iterations
    );
    Ok(RunOutcome {
        stop: RunStop::Exhausted {
            max_iterations: config.max_iterations,
        },
        stats,
    })
}

fn iteration_outcome(
    iteration: u32,
    invocation: &Invocation,
    promise: Option<Promise>,
) -> IterationOutcome {
    IterationOutcome {
        iteration,
        exit_code: invocation.exit_code,
        promise,
        transcript: invocation.transcript.clone(),
        stderr: invocation.stderr.clone(),
    }
}
