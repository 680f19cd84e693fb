//! Error types for the scheduling engine.

use reveille_core::types::{AlarmId, AlarmState};
use std::fmt;

/// Errors from a Clock/Timer source registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    #[error("Exact alarm permission denied by host")]
    PermissionDenied,
    #[error("No async runtime available to arm the timer")]
    RuntimeUnavailable,
    #[error("Timer source rejected registration: {0}")]
    Rejected(String),
}

/// State an alarm was found in when an operation was refused.
///
/// `Unknown` stands for an id with no record at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoundState {
    Unknown,
    Known(AlarmState),
}

impl fmt::Display for FoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoundState::Unknown => write!(f, "unknown"),
            FoundState::Known(state) => write!(f, "{}", state),
        }
    }
}

impl From<Option<AlarmState>> for FoundState {
    fn from(state: Option<AlarmState>) -> Self {
        state.map_or(FoundState::Unknown, FoundState::Known)
    }
}

/// Errors from the alarm scheduler and delivery controller.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Scheduling failed for alarm {id}: {source}")]
    SchedulingFailure {
        id: AlarmId,
        #[source]
        source: TimerError,
    },
    #[error("Invalid state transition for alarm {id}: {from} -> {to}")]
    InvalidStateTransition {
        id: AlarmId,
        from: FoundState,
        to: AlarmState,
    },
    #[error("Alarm not found: {0}")]
    NotFound(AlarmId),
}

/// Errors from decoding a bridge method call.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    /// Stable code reported to the caller alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::MissingArgument(_) | BridgeError::InvalidArgument { .. } => {
                "invalid_arguments"
            }
            BridgeError::Scheduler(SchedulerError::SchedulingFailure { .. }) => {
                "scheduling_failure"
            }
            BridgeError::Scheduler(SchedulerError::InvalidStateTransition { .. }) => {
                "invalid_state_transition"
            }
            BridgeError::Scheduler(SchedulerError::NotFound(_)) => "not_found",
            BridgeError::Serialization(_) => "serialization",
        }
    }
}
