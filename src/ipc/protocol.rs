//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::service::{ErrorKind, InstallError};
use crate::state::{MappingStatus, ServiceState};

/// Largest frame either side will accept
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from UI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current mapping status
    GetStatus,

    /// Install and load the remapping agent
    EnableMapping,

    /// Unload and remove the remapping agent
    DisableMapping,

    /// Ping to check connectivity
    Ping,

    /// Turn this connection into a stream of status notifications
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current mapping status
    Status(DaemonStatus),

    /// Outcome of an enable or disable request
    Operation {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<OperationError>,
    },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn from_result(result: Result<(), InstallError>) -> Self {
        match result {
            Ok(()) => Response::Operation {
                success: true,
                error: None,
            },
            Err(e) => Response::Operation {
                success: false,
                error: Some(OperationError {
                    kind: e.kind(),
                    message: e.to_string(),
                }),
            },
        }
    }
}

/// Why an enable or disable request failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The mapping status changed
    StatusChanged(MappingView),
}

/// What a UI binds to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingView {
    pub is_mapping_enabled: bool,
    pub is_loading: bool,
    pub error_message: Option<String>,
    pub state: ServiceState,
}

impl From<&MappingStatus> for MappingView {
    fn from(status: &MappingStatus) -> Self {
        Self {
            is_mapping_enabled: status.is_mapping_enabled(),
            is_loading: status.loading,
            error_message: status.last_error.clone(),
            state: status.state,
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Agent label being managed
    pub label: String,

    #[serde(flatten)]
    pub mapping: MappingView,

    /// Uptime in seconds
    pub uptime_secs: u64,
}
