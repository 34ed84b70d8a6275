//! Bounded build-loop driver for an external coding agent.
//!
//! The driver invokes the agent once per iteration with a freshly rendered
//! instruction document, decodes its stream-JSON output, and watches the
//! accumulated text for a `[[PROMISE:<TOKEN>]]` completion sentinel. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (event decoding, promise
//!   detection, statistics). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (process supervision, prompt
//!   rendering, session persistence, notifications). Isolated to enable
//!   mocking in tests.
//!
//! The [`runloop`] module owns the iteration state machine and is the only
//! component with cross-iteration memory besides the statistics aggregator.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod runloop;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
