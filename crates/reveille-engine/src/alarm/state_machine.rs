//! Alarm state machine with validated transitions.
//!
//! Scheduled -> Ringing -> Snoozed -> Ringing ...
//! Ringing -> Stopped
//! Scheduled/Snoozed/Ringing -> Cancelled

use crate::error::SchedulerError;
use reveille_core::types::{AlarmId, AlarmState};

/// Whether `from -> to` is an allowed alarm transition.
///
/// Valid transitions:
/// - Scheduled -> Ringing (timer fired)
/// - Snoozed -> Ringing (snooze elapsed)
/// - Scheduled -> Snoozed, Snoozed -> Snoozed, Ringing -> Snoozed (snooze)
/// - Ringing -> Stopped (user stop or ring timeout)
/// - Scheduled/Snoozed/Ringing -> Cancelled
pub fn can_transition(from: AlarmState, to: AlarmState) -> bool {
    matches!(
        (from, to),
        (AlarmState::Scheduled, AlarmState::Ringing)
            | (AlarmState::Snoozed, AlarmState::Ringing)
            | (AlarmState::Scheduled, AlarmState::Snoozed)
            | (AlarmState::Snoozed, AlarmState::Snoozed)
            | (AlarmState::Ringing, AlarmState::Snoozed)
            | (AlarmState::Ringing, AlarmState::Stopped)
            | (AlarmState::Scheduled, AlarmState::Cancelled)
            | (AlarmState::Snoozed, AlarmState::Cancelled)
            | (AlarmState::Ringing, AlarmState::Cancelled)
    )
}

/// Validate a transition for `id`, where `from` is `None` for an unknown id.
pub fn validate_transition(
    id: AlarmId,
    from: Option<AlarmState>,
    to: AlarmState,
) -> Result<(), SchedulerError> {
    match from {
        Some(state) if can_transition(state, to) => Ok(()),
        _ => Err(SchedulerError::InvalidStateTransition {
            id,
            from: from.into(),
            to,
        }),
    }
}
