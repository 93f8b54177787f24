//! Lifecycle error types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::ServiceState;

/// The two lifecycle transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Enable,
    Disable,
}

impl Operation {
    /// State the operation is expected to leave the agent in
    pub fn target(self) -> ServiceState {
        match self {
            Operation::Enable => ServiceState::Enabled,
            Operation::Disable => ServiceState::Disabled,
        }
    }

    pub(crate) fn as_upper(self) -> &'static str {
        match self {
            Operation::Enable => "ENABLE",
            Operation::Disable => "DISABLE",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Enable => write!(f, "enable"),
            Operation::Disable => write!(f, "disable"),
        }
    }
}

/// Failure of an enable or disable call
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("failed to write helper script {path}: {source}")]
    ScriptWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write service descriptor {path}: {source}")]
    DescriptorWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("administrator privileges were declined or the privileged step failed")]
    PermissionDenied,

    #[error("another enable or disable is already in progress")]
    Busy,

    #[error("key mapping is {observed} after {operation}, expected {}", .operation.target())]
    VerificationMismatch {
        operation: Operation,
        observed: ServiceState,
    },

    #[error("{0} did not run to completion")]
    Interrupted(Operation),
}

/// Serialisable classification of an [`InstallError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ScriptWriteFailed,
    DescriptorWriteFailed,
    PermissionDenied,
    Busy,
    VerificationMismatch,
    Interrupted,
}

impl InstallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InstallError::ScriptWriteFailed { .. } => ErrorKind::ScriptWriteFailed,
            InstallError::DescriptorWriteFailed { .. } => ErrorKind::DescriptorWriteFailed,
            InstallError::PermissionDenied => ErrorKind::PermissionDenied,
            InstallError::Busy => ErrorKind::Busy,
            InstallError::VerificationMismatch { .. } => ErrorKind::VerificationMismatch,
            InstallError::Interrupted(_) => ErrorKind::Interrupted,
        }
    }
}
