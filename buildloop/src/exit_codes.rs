//! Stable exit codes for the buildloop CLI.

/// The run ended with `BUILD_COMPLETE`.
pub const OK: i32 = 0;
/// The iteration cap was reached without `BUILD_COMPLETE`.
pub const EXHAUSTED: i32 = 1;
/// Invalid configuration or inputs; nothing was spawned.
pub const CONFIG: i32 = 2;
/// The agent process exceeded its timeout and was killed.
pub const TIMEOUT: i32 = 124;
/// The agent executable could not be located.
pub const AGENT_NOT_FOUND: i32 = 127;
