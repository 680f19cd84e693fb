//! Alarm scheduler: entry point for booking, cancelling and snoozing alarms.
//!
//! The scheduler is the sole owner of timer registrations. The alarm store,
//! the registration table and the ring tokens live behind one mutex, so every
//! compound operation on an id (void old registration, register, commit
//! record) is atomic with respect to fires and other callers. Events are sent
//! before the lock is released, so the event stream follows commit order.

use crate::alarm::state_machine::validate_transition;
use crate::alarm::AlarmStore;
use crate::clock::Clock;
use crate::error::SchedulerError;
use crate::timer::{RegistrationHandle, TimerSource};
use reveille_core::events::AlarmEvent;
use reveille_core::types::{Alarm, AlarmId, AlarmState, Timestamp};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// Identifies one ring of one alarm.
///
/// Tokens come from a scheduler-wide sequence and are never reused, even
/// when an id is cancelled and scheduled again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingToken(u64);

/// Alarm records, the live timer registration of each id and the token of
/// each ring in progress.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    pub(crate) store: AlarmStore,
    registrations: HashMap<AlarmId, RegistrationHandle>,
    rings: HashMap<AlarmId, RingToken>,
    last_ring: u64,
}

impl Ledger {
    pub(crate) fn registration(&self, id: AlarmId) -> Option<RegistrationHandle> {
        self.registrations.get(&id).copied()
    }

    pub(crate) fn ring(&self, id: AlarmId) -> Option<RingToken> {
        self.rings.get(&id).copied()
    }

    pub(crate) fn begin_ring(&mut self, id: AlarmId) -> RingToken {
        self.last_ring += 1;
        let token = RingToken(self.last_ring);
        self.rings.insert(id, token);
        token
    }
}

/// Outbound channel of delivery events.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<AlarmEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<AlarmEvent>) -> Self {
        Self { tx }
    }

    /// A sink together with the receiving end for the presenter.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AlarmEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Never blocks; safe to call with the ledger locked.
    pub(crate) fn emit(&self, event: AlarmEvent) {
        let kind = event.kind();
        let id = event.id();
        if self.tx.send(event).is_err() {
            tracing::debug!(alarm_id = %id, event = kind, "No presenter listening, event dropped");
        }
    }
}

/// Decides when each alarm fires and books it with the timer source.
pub struct AlarmScheduler {
    ledger: Mutex<Ledger>,
    timer: Arc<dyn TimerSource>,
    clock: Arc<dyn Clock>,
    events: EventSink,
    retention: Duration,
}

impl AlarmScheduler {
    /// Create a scheduler. Stopped alarms are dropped immediately unless a
    /// retention window is set with [`AlarmScheduler::with_retention`].
    pub fn new(timer: Arc<dyn TimerSource>, clock: Arc<dyn Clock>, events: EventSink) -> Self {
        Self {
            ledger: Mutex::new(Ledger::default()),
            timer,
            clock,
            events,
            retention: Duration::ZERO,
        }
    }

    /// Keep stopped alarms listed for `retention` before purging them.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Schedule (or reschedule) alarm `id` to ring at `fire_at`.
    ///
    /// Any earlier registration for `id` is voided first; the new alarm fully
    /// replaces the old one. Instants in the past are clamped to now and fire
    /// as soon as the timer source allows. If the timer source refuses the
    /// booking the alarm is dropped and the failure is returned.
    pub fn schedule(
        &self,
        id: AlarmId,
        fire_at: Timestamp,
        vibration_enabled: bool,
    ) -> Result<(), SchedulerError> {
        let now = self.clock.now();
        if fire_at < now {
            tracing::debug!(alarm_id = %id, fire_at = fire_at.0, now = now.0, "Past-due alarm, firing immediately");
        }
        let due = fire_at.max(now);

        let mut ledger = self.lock();
        let replaced_ringing = ledger
            .store
            .get(id)
            .is_some_and(|a| a.state == AlarmState::Ringing);
        self.release(&mut ledger, id);

        let result = match self.timer.register(id, due) {
            Ok(handle) => {
                ledger.registrations.insert(id, handle);
                ledger.store.put(Alarm::scheduled(id, due, vibration_enabled, now));
                tracing::info!(alarm_id = %id, fire_at = %due.to_datetime(), vibration_enabled, "Alarm scheduled");
                Ok(())
            }
            Err(source) => {
                ledger.store.remove(id);
                tracing::warn!(alarm_id = %id, error = %source, "Timer source refused alarm");
                Err(SchedulerError::SchedulingFailure { id, source })
            }
        };

        if replaced_ringing {
            self.events.emit(AlarmEvent::Stopped { id });
        }
        result
    }

    /// Cancel alarm `id`. Unknown ids are a no-op.
    ///
    /// A ringing alarm is stopped as if the user pressed stop, and a
    /// `Stopped` event is emitted for it.
    pub fn cancel(&self, id: AlarmId) -> Result<(), SchedulerError> {
        let mut ledger = self.lock();
        self.release(&mut ledger, id);

        let Some(alarm) = ledger.store.remove(id) else {
            tracing::debug!(alarm_id = %id, "Cancel of unknown alarm ignored");
            return Ok(());
        };
        tracing::info!(alarm_id = %id, state = %alarm.state, "Alarm cancelled");

        if alarm.state == AlarmState::Ringing {
            self.events.emit(AlarmEvent::Stopped { id });
        }
        Ok(())
    }

    /// Re-arm alarm `id` to ring `delay` from now.
    ///
    /// The alarm must be scheduled, snoozed or ringing. Emits
    /// `SnoozeScheduled` and returns the next fire instant.
    pub fn snooze(&self, id: AlarmId, delay: Duration) -> Result<Timestamp, SchedulerError> {
        let mut ledger = self.lock();
        self.snooze_locked(&mut ledger, id, delay)
    }

    /// Snapshot of one alarm.
    pub fn get(&self, id: AlarmId) -> Option<Alarm> {
        self.lock().store.get(id).cloned()
    }

    /// Snapshot of all alarms, ordered by next fire time.
    pub fn alarms(&self) -> Vec<Alarm> {
        let mut alarms: Vec<Alarm> = self.lock().store.all().cloned().collect();
        alarms.sort_by_key(|a| (a.fire_at, a.id));
        alarms
    }

    /// Number of live timer registrations.
    pub fn registration_count(&self) -> usize {
        self.lock().registrations.len()
    }

    /// The registration currently booked for `id`, if any.
    pub fn registration(&self, id: AlarmId) -> Option<RegistrationHandle> {
        self.lock().registration(id)
    }

    /// Drop stopped alarms whose retention window has passed.
    pub fn purge_resolved(&self) -> Vec<AlarmId> {
        let now = self.clock.now();
        let mut ledger = self.lock();
        let expired: Vec<AlarmId> = ledger
            .store
            .all()
            .filter(|a| a.state == AlarmState::Stopped)
            .filter(|a| {
                a.resolved_at
                    .is_some_and(|at| at.saturating_add(self.retention) <= now)
            })
            .map(|a| a.id)
            .collect();

        for id in &expired {
            ledger.store.remove(*id);
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "Purged stopped alarms");
        }
        expired
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // -------------------------------------------------------------------------
    // Crate-internal operations for the delivery controller
    // -------------------------------------------------------------------------

    /// Lock the ledger.
    ///
    /// A panic while holding the lock leaves plain records behind, so a
    /// poisoned lock is recovered rather than propagated.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit(&self, event: AlarmEvent) {
        self.events.emit(event);
    }

    /// Void the live registration for `id` and end the ring in progress, if any.
    pub(crate) fn release(&self, ledger: &mut Ledger, id: AlarmId) {
        if let Some(handle) = ledger.registrations.remove(&id) {
            self.timer.unregister(handle);
        }
        ledger.rings.remove(&id);
    }

    /// Snooze with the ledger held. Emits `SnoozeScheduled`, or `Stopped`
    /// when a ringing alarm is dropped because the timer source refused it.
    pub(crate) fn snooze_locked(
        &self,
        ledger: &mut Ledger,
        id: AlarmId,
        delay: Duration,
    ) -> Result<Timestamp, SchedulerError> {
        let state = ledger.store.get(id).map(|a| a.state);
        validate_transition(id, state, AlarmState::Snoozed)?;

        let next_fire_at = self.clock.now().saturating_add(delay);
        self.release(ledger, id);

        match self.timer.register(id, next_fire_at) {
            Ok(handle) => {
                ledger.registrations.insert(id, handle);
                if let Some(alarm) = ledger.store.get_mut(id) {
                    alarm.state = AlarmState::Snoozed;
                    alarm.fire_at = next_fire_at;
                }
                tracing::info!(alarm_id = %id, next_fire_at = %next_fire_at.to_datetime(), "Alarm snoozed");
                self.events.emit(AlarmEvent::SnoozeScheduled { id, next_fire_at });
                Ok(next_fire_at)
            }
            Err(source) => {
                ledger.store.remove(id);
                tracing::warn!(alarm_id = %id, error = %source, "Timer source refused snooze");
                if state == Some(AlarmState::Ringing) {
                    self.events.emit(AlarmEvent::Stopped { id });
                }
                Err(SchedulerError::SchedulingFailure { id, source })
            }
        }
    }

    /// Move a ringing alarm to `Stopped`, release its registration and emit
    /// `Stopped`.
    pub(crate) fn stop_locked(
        &self,
        ledger: &mut Ledger,
        id: AlarmId,
    ) -> Result<AlarmEvent, SchedulerError> {
        let state = ledger.store.get(id).map(|a| a.state);
        validate_transition(id, state, AlarmState::Stopped)?;

        self.release(ledger, id);
        if self.retention.is_zero() {
            ledger.store.remove(id);
        } else if let Some(alarm) = ledger.store.get_mut(id) {
            alarm.state = AlarmState::Stopped;
            alarm.resolved_at = Some(self.clock.now());
        }
        tracing::info!(alarm_id = %id, "Alarm stopped");

        let event = AlarmEvent::Stopped { id };
        self.events.emit(event.clone());
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::TimerError;
    use crate::timer::ManualTimerSource;

    struct Harness {
        scheduler: AlarmScheduler,
        timer: Arc<ManualTimerSource>,
        clock: Arc<ManualClock>,
        events: mpsc::UnboundedReceiver<AlarmEvent>,
    }

    fn harness(now: i64) -> Harness {
        let timer = Arc::new(ManualTimerSource::new());
        let clock = Arc::new(ManualClock::new(Timestamp(now)));
        let (sink, events) = EventSink::channel();
        let scheduler = AlarmScheduler::new(timer.clone(), clock.clone(), sink);
        Harness {
            scheduler,
            timer,
            clock,
            events,
        }
    }

    fn set_state(h: &Harness, id: i64, state: AlarmState) {
        h.scheduler.lock().store.get_mut(AlarmId(id)).unwrap().state = state;
    }

    #[test]
    fn test_schedule_stores_and_registers() {
        let h = harness(0);
        h.scheduler.schedule(AlarmId(1), Timestamp(1_000), true).unwrap();

        let alarm = h.scheduler.get(AlarmId(1)).unwrap();
        assert_eq!(alarm.state, AlarmState::Scheduled);
        assert_eq!(alarm.fire_at, Timestamp(1_000));
        assert!(alarm.vibration_enabled);

        let bookings = h.timer.bookings_for(AlarmId(1));
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].fire_at, Timestamp(1_000));
        assert_eq!(h.scheduler.registration(AlarmId(1)), Some(bookings[0].handle));
    }

    #[test]
    fn test_schedule_twice_last_write_wins() {
        let h = harness(0);
        h.scheduler.schedule(AlarmId(1), Timestamp(1_000), true).unwrap();
        h.scheduler.schedule(AlarmId(1), Timestamp(2_000), false).unwrap();

        let bookings = h.timer.bookings_for(AlarmId(1));
        assert_eq!(bookings.len(), 1, "Exactly one registration survives");
        assert_eq!(bookings[0].fire_at, Timestamp(2_000));

        let alarm = h.scheduler.get(AlarmId(1)).unwrap();
        assert_eq!(alarm.fire_at, Timestamp(2_000));
        assert!(!alarm.vibration_enabled);
        assert_eq!(h.scheduler.registration_count(), 1);
    }

    #[test]
    fn test_schedule_past_due_is_clamped_to_now() {
        let h = harness(10_000);
        h.scheduler.schedule(AlarmId(3), Timestamp(500), false).unwrap();

        let bookings = h.timer.bookings_for(AlarmId(3));
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].fire_at, Timestamp(10_000));
        assert_eq!(h.timer.due(h.clock.now()).len(), 1, "Due right away");
    }

    #[test]
    fn test_schedule_failure_propagates_and_leaves_nothing() {
        let h = harness(0);
        h.scheduler.schedule(AlarmId(1), Timestamp(1_000), false).unwrap();
        h.timer.set_denied(true);

        let err = h
            .scheduler
            .schedule(AlarmId(1), Timestamp(2_000), false)
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::SchedulingFailure {
                id: AlarmId(1),
                source: TimerError::PermissionDenied
            }
        ));
        assert!(h.scheduler.get(AlarmId(1)).is_none());
        assert!(h.timer.bookings().is_empty());
        assert_eq!(h.scheduler.registration_count(), 0);
    }

    #[test]
    fn test_schedule_over_ringing_emits_stopped() {
        let mut h = harness(0);
        h.scheduler.schedule(AlarmId(1), Timestamp(0), false).unwrap();
        set_state(&h, 1, AlarmState::Ringing);

        h.scheduler.schedule(AlarmId(1), Timestamp(5_000), false).unwrap();
        assert_eq!(h.events.try_recv().unwrap(), AlarmEvent::Stopped { id: AlarmId(1) });
        assert_eq!(h.scheduler.get(AlarmId(1)).unwrap().state, AlarmState::Scheduled);
    }

    #[test]
    fn test_cancel_removes_and_unregisters() {
        let mut h = harness(0);
        h.scheduler.schedule(AlarmId(2), Timestamp(2_000), false).unwrap();
        h.scheduler.cancel(AlarmId(2)).unwrap();

        assert!(h.scheduler.get(AlarmId(2)).is_none());
        assert!(h.timer.bookings().is_empty());
        assert!(h.events.try_recv().is_err(), "Cancelling a pending alarm is silent");
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let h = harness(0);
        h.scheduler.schedule(AlarmId(2), Timestamp(2_000), false).unwrap();
        assert!(h.scheduler.cancel(AlarmId(2)).is_ok());
        assert!(h.scheduler.cancel(AlarmId(2)).is_ok());
        assert!(h.scheduler.cancel(AlarmId(99)).is_ok());
        assert_eq!(h.scheduler.registration_count(), 0);
        assert!(h.timer.bookings().is_empty());
    }

    #[test]
    fn test_cancel_ringing_falls_back_to_stop() {
        let mut h = harness(0);
        h.scheduler.schedule(AlarmId(5), Timestamp(0), true).unwrap();
        set_state(&h, 5, AlarmState::Ringing);

        h.scheduler.cancel(AlarmId(5)).unwrap();
        assert_eq!(h.events.try_recv().unwrap(), AlarmEvent::Stopped { id: AlarmId(5) });
        assert!(h.scheduler.get(AlarmId(5)).is_none());
    }

    #[test]
    fn test_cancel_retained_stop_is_silent() {
        let timer = Arc::new(ManualTimerSource::new());
        let clock = Arc::new(ManualClock::new(Timestamp(0)));
        let (sink, mut events) = EventSink::channel();
        let scheduler = AlarmScheduler::new(timer, clock, sink).with_retention(Duration::from_secs(60));

        scheduler.schedule(AlarmId(6), Timestamp(0), false).unwrap();
        scheduler.lock().store.get_mut(AlarmId(6)).unwrap().state = AlarmState::Ringing;
        {
            let mut ledger = scheduler.lock();
            scheduler.stop_locked(&mut ledger, AlarmId(6)).unwrap();
        }
        assert_eq!(events.try_recv().unwrap(), AlarmEvent::Stopped { id: AlarmId(6) });

        scheduler.cancel(AlarmId(6)).unwrap();
        assert!(scheduler.get(AlarmId(6)).is_none());
        assert!(events.try_recv().is_err(), "Already stopped, nothing new to report");
    }

    #[test]
    fn test_ring_tokens_never_repeat() {
        let h = harness(0);
        h.scheduler.schedule(AlarmId(1), Timestamp(0), false).unwrap();
        let first = h.scheduler.lock().begin_ring(AlarmId(1));

        h.scheduler.cancel(AlarmId(1)).unwrap();
        assert_eq!(h.scheduler.lock().ring(AlarmId(1)), None);

        h.scheduler.schedule(AlarmId(1), Timestamp(0), false).unwrap();
        let second = h.scheduler.lock().begin_ring(AlarmId(1));
        assert_ne!(first, second);
        assert_eq!(h.scheduler.lock().ring(AlarmId(1)), Some(second));
    }

    #[test]
    fn test_snooze_scheduled_alarm() {
        let mut h = harness(1_000);
        h.scheduler.schedule(AlarmId(1), Timestamp(5_000), false).unwrap();

        let next = h.scheduler.snooze(AlarmId(1), Duration::from_secs(60)).unwrap();
        assert_eq!(next, Timestamp(61_000));

        let alarm = h.scheduler.get(AlarmId(1)).unwrap();
        assert_eq!(alarm.state, AlarmState::Snoozed);
        assert_eq!(alarm.fire_at, Timestamp(61_000));

        let bookings = h.timer.bookings_for(AlarmId(1));
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].fire_at, Timestamp(61_000));

        assert_eq!(
            h.events.try_recv().unwrap(),
            AlarmEvent::SnoozeScheduled {
                id: AlarmId(1),
                next_fire_at: Timestamp(61_000)
            }
        );
    }

    #[test]
    fn test_snooze_unknown_is_invalid_transition() {
        let h = harness(0);
        let err = h.scheduler.snooze(AlarmId(8), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_snooze_after_cancel_is_invalid_transition() {
        let h = harness(0);
        h.scheduler.schedule(AlarmId(8), Timestamp(100), false).unwrap();
        h.scheduler.cancel(AlarmId(8)).unwrap();
        let err = h.scheduler.snooze(AlarmId(8), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_snooze_failure_drops_alarm() {
        let h = harness(0);
        h.scheduler.schedule(AlarmId(1), Timestamp(100), false).unwrap();
        h.timer.set_denied(true);

        let err = h.scheduler.snooze(AlarmId(1), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, SchedulerError::SchedulingFailure { .. }));
        assert!(h.scheduler.get(AlarmId(1)).is_none());
        assert_eq!(h.scheduler.registration_count(), 0);
    }

    #[test]
    fn test_stop_without_retention_removes_record() {
        let h = harness(0);
        h.scheduler.schedule(AlarmId(1), Timestamp(0), false).unwrap();
        set_state(&h, 1, AlarmState::Ringing);

        let mut ledger = h.scheduler.lock();
        let event = h.scheduler.stop_locked(&mut ledger, AlarmId(1)).unwrap();
        drop(ledger);

        assert_eq!(event, AlarmEvent::Stopped { id: AlarmId(1) });
        assert!(h.scheduler.get(AlarmId(1)).is_none());
        assert!(h.timer.bookings().is_empty());
    }

    #[test]
    fn test_stop_with_retention_then_purge() {
        let timer = Arc::new(ManualTimerSource::new());
        let clock = Arc::new(ManualClock::new(Timestamp(0)));
        let (sink, _events) = EventSink::channel();
        let scheduler = AlarmScheduler::new(timer, clock.clone(), sink)
            .with_retention(Duration::from_secs(60));

        scheduler.schedule(AlarmId(1), Timestamp(0), false).unwrap();
        scheduler.lock().store.get_mut(AlarmId(1)).unwrap().state = AlarmState::Ringing;
        {
            let mut ledger = scheduler.lock();
            scheduler.stop_locked(&mut ledger, AlarmId(1)).unwrap();
        }

        let alarm = scheduler.get(AlarmId(1)).unwrap();
        assert_eq!(alarm.state, AlarmState::Stopped);
        assert_eq!(alarm.resolved_at, Some(Timestamp(0)));

        clock.advance(Duration::from_secs(30));
        assert!(scheduler.purge_resolved().is_empty());

        clock.advance(Duration::from_secs(30));
        assert_eq!(scheduler.purge_resolved(), vec![AlarmId(1)]);
        assert!(scheduler.get(AlarmId(1)).is_none());
    }

    #[test]
    fn test_stop_requires_ringing() {
        let h = harness(0);
        h.scheduler.schedule(AlarmId(4), Timestamp(1_000), false).unwrap();
        let mut ledger = h.scheduler.lock();
        let err = h.scheduler.stop_locked(&mut ledger, AlarmId(4)).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_alarms_sorted_by_fire_time() {
        let h = harness(0);
        h.scheduler.schedule(AlarmId(1), Timestamp(3_000), false).unwrap();
        h.scheduler.schedule(AlarmId(2), Timestamp(1_000), false).unwrap();
        h.scheduler.schedule(AlarmId(3), Timestamp(2_000), false).unwrap();

        let ids: Vec<AlarmId> = h.scheduler.alarms().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![AlarmId(2), AlarmId(3), AlarmId(1)]);
    }

    #[test]
    fn test_events_dropped_without_receiver() {
        let timer = Arc::new(ManualTimerSource::new());
        let clock = Arc::new(ManualClock::new(Timestamp(0)));
        let (sink, events) = EventSink::channel();
        drop(events);
        let scheduler = AlarmScheduler::new(timer, clock, sink);

        scheduler.schedule(AlarmId(1), Timestamp(10), false).unwrap();
        assert!(scheduler.snooze(AlarmId(1), Duration::from_secs(1)).is_ok());
    }
}
