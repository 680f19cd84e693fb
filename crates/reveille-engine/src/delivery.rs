//! Delivery controller: turns timer fires into ringing alarms and applies
//! the user's resolution.
//!
//! Fires arrive on an asynchronous callback path with nobody to report
//! errors to, so every fire that does not match a pending alarm is logged
//! and discarded.

use crate::error::SchedulerError;
use crate::scheduler::{AlarmScheduler, Ledger, RingToken};
use crate::timer::{FireSignal, RegistrationHandle};
use reveille_core::events::AlarmEvent;
use reveille_core::types::{Alarm, AlarmId, AlarmState, Resolution};
use std::sync::Arc;
use std::time::Duration;

/// Default delay applied by [`Resolution::Snooze`].
pub const DEFAULT_SNOOZE_DELAY: Duration = Duration::from_secs(60);

/// A ring that has just started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ring {
    /// Snapshot of the alarm as it entered `Ringing`.
    pub alarm: Alarm,
    /// Token a ring timeout must present to stop this ring.
    pub token: RingToken,
}

/// State machine from fired timer to resolved alarm.
pub struct AlarmDeliveryController {
    scheduler: Arc<AlarmScheduler>,
    snooze_delay: Duration,
}

impl AlarmDeliveryController {
    pub fn new(scheduler: Arc<AlarmScheduler>) -> Self {
        Self {
            scheduler,
            snooze_delay: DEFAULT_SNOOZE_DELAY,
        }
    }

    pub fn with_snooze_delay(mut self, snooze_delay: Duration) -> Self {
        self.snooze_delay = snooze_delay;
        self
    }

    pub fn scheduler(&self) -> &Arc<AlarmScheduler> {
        &self.scheduler
    }

    /// Alarm `id` is due: start ringing it.
    ///
    /// Only a `Scheduled` or `Snoozed` alarm rings; anything else (unknown,
    /// already ringing, stopped) is a no-op. Returns the ring when a
    /// `Ringing` event was emitted.
    pub fn on_fire(&self, id: AlarmId) -> Option<Ring> {
        self.fire(id, None)
    }

    /// Timer callback path: like [`on_fire`](Self::on_fire), but signals from
    /// a registration that has since been voided are discarded.
    pub fn on_timer(&self, signal: FireSignal) -> Option<Ring> {
        self.fire(signal.id, Some(signal.handle))
    }

    /// Apply the user's answer to a ringing alarm.
    ///
    /// Fails with `InvalidStateTransition` unless `id` is ringing. Returns
    /// the event that was emitted.
    pub fn resolve(&self, id: AlarmId, action: Resolution) -> Result<AlarmEvent, SchedulerError> {
        let mut ledger = self.scheduler.lock();
        let state = ledger.store.get(id).map(|a| a.state);
        if state != Some(AlarmState::Ringing) {
            let to = match action {
                Resolution::Stop => AlarmState::Stopped,
                Resolution::Snooze => AlarmState::Snoozed,
            };
            return Err(SchedulerError::InvalidStateTransition {
                id,
                from: state.into(),
                to,
            });
        }

        let event = match action {
            Resolution::Stop => self.scheduler.stop_locked(&mut ledger, id)?,
            Resolution::Snooze => {
                let next_fire_at = self.scheduler.snooze_locked(&mut ledger, id, self.snooze_delay)?;
                AlarmEvent::SnoozeScheduled { id, next_fire_at }
            }
        };
        tracing::info!(alarm_id = %id, action = %action, "Alarm resolved");
        Ok(event)
    }

    /// Ring timeout: stop alarm `id` if `token` still names its current ring.
    ///
    /// Returns whether the alarm was stopped.
    pub fn expire_ringing(&self, id: AlarmId, token: RingToken) -> bool {
        let mut ledger = self.scheduler.lock();
        if ledger.ring(id) != Some(token) {
            return false;
        }

        match self.scheduler.stop_locked(&mut ledger, id) {
            Ok(_) => {
                tracing::info!(alarm_id = %id, "Ring timed out, alarm stopped");
                true
            }
            Err(e) => {
                tracing::warn!(alarm_id = %id, error = %e, "Ring timeout could not stop alarm");
                false
            }
        }
    }

    fn fire(&self, id: AlarmId, expected: Option<RegistrationHandle>) -> Option<Ring> {
        let mut ledger = self.scheduler.lock();
        if let Some(handle) = expected {
            if ledger.registration(id) != Some(handle) {
                tracing::debug!(alarm_id = %id, "Discarding fire from a voided registration");
                return None;
            }
        }

        let ring = self.start_ringing(&mut ledger, id)?;
        tracing::info!(alarm_id = %id, ring_count = ring.alarm.ring_count, "Alarm ringing");
        self.scheduler.emit(AlarmEvent::Ringing {
            id,
            vibration_enabled: ring.alarm.vibration_enabled,
        });
        Some(ring)
    }

    fn start_ringing(&self, ledger: &mut Ledger, id: AlarmId) -> Option<Ring> {
        match ledger.store.get(id).map(|a| a.state) {
            Some(state) if state.is_armed() => {}
            Some(state) => {
                tracing::debug!(alarm_id = %id, state = %state, "Fire ignored, alarm not pending");
                return None;
            }
            None => {
                tracing::debug!(alarm_id = %id, "Fire ignored, alarm not found");
                return None;
            }
        }

        // The booking that produced this fire is spent.
        self.scheduler.release(ledger, id);
        let token = ledger.begin_ring(id);

        let alarm = ledger.store.get_mut(id)?;
        alarm.state = AlarmState::Ringing;
        alarm.ring_count += 1;
        Some(Ring {
            alarm: alarm.clone(),
            token,
        })
    }
}
