//! I/O collaborators for the driver.

pub mod agent;
pub mod config;
pub mod discovery;
pub mod notify;
pub mod process;
pub mod prompt;
pub mod session;
