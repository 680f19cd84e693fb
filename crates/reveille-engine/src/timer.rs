//! Clock/Timer sources: "fire a callback at wall-clock time T".
//!
//! Registration never blocks. Fires are delivered later as [`FireSignal`]s,
//! carrying the handle of the registration that produced them so the
//! delivery controller can discard signals from voided registrations.

use crate::clock::Clock;
use crate::error::TimerError;
use reveille_core::types::{AlarmId, Timestamp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Opaque token for one active timer booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationHandle(Uuid);

impl RegistrationHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RegistrationHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A timer reached its due instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FireSignal {
    pub id: AlarmId,
    pub handle: RegistrationHandle,
}

/// Contract of the Clock/Timer source the scheduler books alarms with.
pub trait TimerSource: Send + Sync {
    /// Book a fire for `id` at `fire_at`. Past instants fire as soon as possible.
    fn register(&self, id: AlarmId, fire_at: Timestamp) -> Result<RegistrationHandle, TimerError>;

    /// Void a booking. Unknown or already-fired handles are ignored.
    fn unregister(&self, handle: RegistrationHandle);
}

// =============================================================================
// Tokio timer source
// =============================================================================

/// Timer source backed by sleeping tokio tasks.
///
/// Each registration spawns one task that sleeps until the due instant and
/// then sends a [`FireSignal`] on the fire channel. Unregistering aborts the
/// task.
pub struct TokioTimerSource {
    clock: Arc<dyn Clock>,
    fire_tx: mpsc::UnboundedSender<FireSignal>,
    runtime: Option<Handle>,
    timers: Mutex<HashMap<RegistrationHandle, JoinHandle<()>>>,
    permitted: AtomicBool,
}

impl TokioTimerSource {
    /// Create a timer source on the current tokio runtime, if any.
    ///
    /// Without a runtime every registration fails with
    /// [`TimerError::RuntimeUnavailable`].
    pub fn new(clock: Arc<dyn Clock>, fire_tx: mpsc::UnboundedSender<FireSignal>) -> Self {
        Self {
            clock,
            fire_tx,
            runtime: Handle::try_current().ok(),
            timers: Mutex::new(HashMap::new()),
            permitted: AtomicBool::new(true),
        }
    }

    /// Grant or revoke the host's exact alarm permission.
    pub fn set_permitted(&self, permitted: bool) {
        self.permitted.store(permitted, Ordering::SeqCst);
        tracing::info!(permitted, "Exact alarm permission updated");
    }

    pub fn is_permitted(&self) -> bool {
        self.permitted.load(Ordering::SeqCst)
    }

    /// Number of bookings that have not fired or been voided yet.
    pub fn pending_count(&self) -> usize {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|task| !task.is_finished())
            .count()
    }
}

impl TimerSource for TokioTimerSource {
    fn register(&self, id: AlarmId, fire_at: Timestamp) -> Result<RegistrationHandle, TimerError> {
        if !self.is_permitted() {
            return Err(TimerError::PermissionDenied);
        }
        let runtime = self.runtime.as_ref().ok_or(TimerError::RuntimeUnavailable)?;
        if self.fire_tx.is_closed() {
            return Err(TimerError::Rejected("fire channel closed".to_string()));
        }

        let handle = RegistrationHandle::new();
        let delay = fire_at.duration_since(self.clock.now());
        let fire_tx = self.fire_tx.clone();

        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if fire_tx.send(FireSignal { id, handle }).is_err() {
                tracing::debug!(alarm_id = %id, "Fire channel closed, dropping timer fire");
            }
        });

        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        timers.retain(|_, task| !task.is_finished());
        timers.insert(handle, task);

        tracing::debug!(alarm_id = %id, delay_ms = delay.as_millis() as u64, "Timer armed");
        Ok(handle)
    }

    fn unregister(&self, handle: RegistrationHandle) {
        let task = self
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        if let Some(task) = task {
            task.abort();
        }
    }
}

// =============================================================================
// Manual timer source
// =============================================================================

/// A booking held by [`ManualTimerSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Booking {
    pub handle: RegistrationHandle,
    pub id: AlarmId,
    pub fire_at: Timestamp,
}

/// Timer source that only records bookings; tests fire them by hand.
#[derive(Debug, Default)]
pub struct ManualTimerSource {
    bookings: Mutex<Vec<Booking>>,
    denied: AtomicBool,
}

impl ManualTimerSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent registration fail with `PermissionDenied`.
    pub fn set_denied(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    /// Live bookings, in registration order.
    pub fn bookings(&self) -> Vec<Booking> {
        self.bookings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Live bookings for one alarm.
    pub fn bookings_for(&self, id: AlarmId) -> Vec<Booking> {
        self.bookings().into_iter().filter(|b| b.id == id).collect()
    }

    /// Consume the booking for `handle` and produce its fire signal.
    pub fn fire(&self, handle: RegistrationHandle) -> Option<FireSignal> {
        let mut bookings = self.bookings.lock().unwrap_or_else(PoisonError::into_inner);
        let pos = bookings.iter().position(|b| b.handle == handle)?;
        let booking = bookings.remove(pos);
        Some(FireSignal {
            id: booking.id,
            handle: booking.handle,
        })
    }

    /// Consume every booking due at or before `now`.
    pub fn due(&self, now: Timestamp) -> Vec<FireSignal> {
        let mut bookings = self.bookings.lock().unwrap_or_else(PoisonError::into_inner);
        let (due, pending): (Vec<Booking>, Vec<Booking>) =
            bookings.drain(..).partition(|b| b.fire_at <= now);
        *bookings = pending;
        due.into_iter()
            .map(|b| FireSignal {
                id: b.id,
                handle: b.handle,
            })
            .collect()
    }
}

impl TimerSource for ManualTimerSource {
    fn register(&self, id: AlarmId, fire_at: Timestamp) -> Result<RegistrationHandle, TimerError> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(TimerError::PermissionDenied);
        }
        let handle = RegistrationHandle::new();
        self.bookings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Booking { handle, id, fire_at });
        Ok(handle)
    }

    fn unregister(&self, handle: RegistrationHandle) {
        self.bookings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|b| b.handle != handle);
    }
}
