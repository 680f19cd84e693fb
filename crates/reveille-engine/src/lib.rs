//! Alarm scheduling and delivery engine for Reveille.
//!
//! Books alarms with a Clock/Timer source, turns timer fires into ringing
//! alarms, and applies the user's snooze or stop resolution.

pub mod alarm;
pub mod bridge;
pub mod clock;
pub mod delivery;
pub mod error;
pub mod scheduler;
pub mod service;
pub mod timer;

pub use alarm::AlarmStore;
pub use bridge::{MethodCall, MethodResult};
pub use clock::{Clock, ManualClock, SystemClock};
pub use delivery::{AlarmDeliveryController, Ring, DEFAULT_SNOOZE_DELAY};
pub use error::{BridgeError, FoundState, SchedulerError, TimerError};
pub use scheduler::{AlarmScheduler, EventSink, RingToken};
pub use service::AlarmService;
pub use timer::{
    Booking, FireSignal, ManualTimerSource, RegistrationHandle, TimerSource, TokioTimerSource,
};
