//! External process execution
//!
//! Runs unprivileged commands (the launchd status query) and privileged
//! transactions behind a single administrator consent prompt.

mod escalator;
pub mod quote;
mod runner;

pub use escalator::{
    OsascriptEscalator, PrivilegeEscalator, PrivilegedStep, PrivilegedTransaction, LAUNCHCTL,
};
pub use runner::{CommandLine, ProcessError, ProcessRunner, SystemRunner};
#[cfg(test)]
pub use runner::CommandOutput;
