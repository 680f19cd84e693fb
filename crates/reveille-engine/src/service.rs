//! Alarm service: wires scheduler, delivery controller and the tokio timer
//! source together and runs the dispatch loop.
//!
//! The dispatch loop is the only consumer of timer fires. It hands each fire
//! to the delivery controller, arms the ring timeout for alarms that started
//! ringing, and periodically purges stopped alarms.

use crate::clock::{Clock, SystemClock};
use crate::delivery::{AlarmDeliveryController, Ring};
use crate::error::SchedulerError;
use crate::scheduler::{AlarmScheduler, EventSink};
use crate::timer::{FireSignal, TokioTimerSource};
use reveille_core::config::SchedulingConfig;
use reveille_core::events::AlarmEvent;
use reveille_core::types::{Alarm, AlarmId, Resolution, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Running alarm service.
pub struct AlarmService {
    scheduler: Arc<AlarmScheduler>,
    controller: Arc<AlarmDeliveryController>,
    timer: Arc<TokioTimerSource>,
    shutdown: Arc<Notify>,
}

impl AlarmService {
    /// Start the service on the current tokio runtime with the system clock.
    ///
    /// Returns the service and the event stream for the presentation layer.
    /// Must be called from within a tokio runtime.
    pub fn start(config: &SchedulingConfig) -> (Self, mpsc::UnboundedReceiver<AlarmEvent>) {
        Self::start_with_clock(config, Arc::new(SystemClock))
    }

    /// Start the service with an explicit clock.
    pub fn start_with_clock(
        config: &SchedulingConfig,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<AlarmEvent>) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        let (sink, events) = EventSink::channel();

        let timer = Arc::new(TokioTimerSource::new(Arc::clone(&clock), fire_tx));
        timer.set_permitted(config.allow_exact_alarms);

        let scheduler = Arc::new(
            AlarmScheduler::new(timer.clone(), clock, sink).with_retention(config.retention()),
        );
        let controller = Arc::new(
            AlarmDeliveryController::new(Arc::clone(&scheduler))
                .with_snooze_delay(config.snooze_delay()),
        );
        let shutdown = Arc::new(Notify::new());

        tokio::spawn(dispatch_loop(
            Arc::clone(&controller),
            fire_rx,
            config.ring_timeout(),
            config.purge_interval(),
            Arc::clone(&shutdown),
        ));
        tracing::info!(
            snooze_delay_ms = config.snooze_delay_ms,
            ring_timeout_ms = config.ring_timeout_ms,
            "Alarm service started"
        );

        (
            Self {
                scheduler,
                controller,
                timer,
                shutdown,
            },
            events,
        )
    }

    /// Schedule alarm `id` for `fire_at_ms` (epoch milliseconds).
    pub fn schedule_alarm(
        &self,
        id: AlarmId,
        fire_at_ms: i64,
        vibration_enabled: bool,
    ) -> Result<(), SchedulerError> {
        self.scheduler
            .schedule(id, Timestamp(fire_at_ms), vibration_enabled)
    }

    /// Cancel alarm `id`; unknown ids succeed.
    pub fn cancel_alarm(&self, id: AlarmId) -> Result<(), SchedulerError> {
        self.scheduler.cancel(id)
    }

    /// Forward the user's answer to a ringing alarm.
    pub fn resolve(&self, id: AlarmId, action: Resolution) -> Result<AlarmEvent, SchedulerError> {
        self.controller.resolve(id, action)
    }

    /// Look up one alarm.
    pub fn alarm(&self, id: AlarmId) -> Result<Alarm, SchedulerError> {
        self.scheduler.get(id).ok_or(SchedulerError::NotFound(id))
    }

    pub fn alarms(&self) -> Vec<Alarm> {
        self.scheduler.alarms()
    }

    /// Grant or revoke the host's exact alarm permission at runtime.
    pub fn set_exact_alarms_permitted(&self, permitted: bool) {
        self.timer.set_permitted(permitted);
    }

    pub fn scheduler(&self) -> &Arc<AlarmScheduler> {
        &self.scheduler
    }

    pub fn controller(&self) -> &Arc<AlarmDeliveryController> {
        &self.controller
    }

    /// Stop the dispatch loop. Pending timers no longer ring.
    pub fn shutdown(&self) {
        tracing::info!("Alarm service shutting down");
        self.shutdown.notify_one();
    }
}

async fn dispatch_loop(
    controller: Arc<AlarmDeliveryController>,
    mut fire_rx: mpsc::UnboundedReceiver<FireSignal>,
    ring_timeout: Duration,
    purge_interval: Duration,
    shutdown: Arc<Notify>,
) {
    let mut purge = tokio::time::interval(purge_interval);
    purge.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                return; // Graceful shutdown
            }
            signal = fire_rx.recv() => {
                let Some(signal) = signal else { return };
                if let Some(ring) = controller.on_timer(signal) {
                    arm_ring_timeout(Arc::clone(&controller), ring, ring_timeout);
                }
            }
            _ = purge.tick() => {
                controller.scheduler().purge_resolved();
            }
        }
    }
}

fn arm_ring_timeout(controller: Arc<AlarmDeliveryController>, ring: Ring, timeout: Duration) {
    if timeout.is_zero() {
        return;
    }
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        controller.expire_ringing(ring.alarm.id, ring.token);
    });
}
