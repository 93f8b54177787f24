//! Events module for lifecycle transitions
//!
//! Provides structured event types emitted by the lifecycle manager
//! when it queries the agent or runs an enable/disable transaction.

use serde::{Deserialize, Serialize};

use crate::service::{ErrorKind, Operation};
use crate::state::ServiceState;

/// Events emitted by the lifecycle manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Ground truth was re-read from the service manager
    StatusRefreshed { state: ServiceState },

    /// An enable or disable transaction began
    TransitionStarted { operation: Operation },

    /// The transaction reached its target state
    TransitionSucceeded {
        operation: Operation,
        state: ServiceState,
    },

    /// The transaction was rejected or did not reach its target state
    TransitionFailed {
        operation: Operation,
        kind: ErrorKind,
        message: String,
    },
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleEvent::StatusRefreshed { state } => write!(f, "STATUS_REFRESHED ({})", state),
            LifecycleEvent::TransitionStarted { operation } => {
                write!(f, "{}_STARTED", operation.as_upper())
            }
            LifecycleEvent::TransitionSucceeded { operation, state } => {
                write!(f, "{}_SUCCEEDED ({})", operation.as_upper(), state)
            }
            LifecycleEvent::TransitionFailed { operation, kind, .. } => {
                write!(f, "{}_FAILED ({:?})", operation.as_upper(), kind)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = LifecycleEvent::TransitionFailed {
            operation: Operation::Enable,
            kind: ErrorKind::PermissionDenied,
            message: "denied".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("transition_failed"));
        assert!(json.contains("permission_denied"));
        assert!(json.contains("\"operation\":\"enable\""));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"status_refreshed","state":"enabled"}"#;
        let event: LifecycleEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(
            event,
            LifecycleEvent::StatusRefreshed {
                state: ServiceState::Enabled
            }
        ));
    }

    #[test]
    fn test_event_display() {
        let event = LifecycleEvent::TransitionStarted {
            operation: Operation::Disable,
        };
        assert_eq!(event.to_string(), "DISABLE_STARTED");
    }
}
