use serde::{Deserialize, Serialize};

use crate::types::{AlarmId, Timestamp};

/// Delivery events emitted by the alarm core for the presentation layer.
///
/// Each event is sent at most once per state transition, on a channel,
/// after the scheduler's lock is released.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AlarmEvent {
    /// The alarm is due; the presenter should show UI and start sound.
    Ringing { id: AlarmId, vibration_enabled: bool },

    /// The alarm stopped ringing (user stop, ring timeout, or a replacing
    /// schedule/cancel). The presenter should release its session.
    Stopped { id: AlarmId },

    /// The alarm was re-armed for a later instant.
    SnoozeScheduled { id: AlarmId, next_fire_at: Timestamp },
}

impl AlarmEvent {
    /// The alarm this event concerns.
    pub fn id(&self) -> AlarmId {
        match self {
            AlarmEvent::Ringing { id, .. }
            | AlarmEvent::Stopped { id }
            | AlarmEvent::SnoozeScheduled { id, .. } => *id,
        }
    }

    /// Short machine name, matching the serialized `event` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            AlarmEvent::Ringing { .. } => "ringing",
            AlarmEvent::Stopped { .. } => "stopped",
            AlarmEvent::SnoozeScheduled { .. } => "snooze_scheduled",
        }
    }
}
