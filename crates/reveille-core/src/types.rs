//! Core value objects shared by every Reveille crate.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Newtype Wrappers
// =============================================================================

/// Stable identifier of a logical alarm.
///
/// The same id survives snoozes and reschedules; scheduling an id that
/// already exists replaces the previous alarm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlarmId(pub i64);

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AlarmId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Wall-clock instant in milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Calendar form, for logs. Out-of-range values map to the epoch.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    /// Instant `delay` after this one, saturating at `i64::MAX`.
    pub fn saturating_add(self, delay: Duration) -> Self {
        let millis = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Time remaining from `now` until this instant; zero when already due.
    pub fn duration_since(self, now: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(now.0).max(0) as u64)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle state of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    Scheduled,
    Ringing,
    Snoozed,
    Stopped,
    Cancelled,
}

impl AlarmState {
    /// Whether a timer registration is expected to be live in this state.
    pub fn is_armed(&self) -> bool {
        matches!(self, AlarmState::Scheduled | AlarmState::Snoozed)
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlarmState::Scheduled => write!(f, "scheduled"),
            AlarmState::Ringing => write!(f, "ringing"),
            AlarmState::Snoozed => write!(f, "snoozed"),
            AlarmState::Stopped => write!(f, "stopped"),
            AlarmState::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for AlarmState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(AlarmState::Scheduled),
            "ringing" => Ok(AlarmState::Ringing),
            "snoozed" => Ok(AlarmState::Snoozed),
            "stopped" => Ok(AlarmState::Stopped),
            "cancelled" => Ok(AlarmState::Cancelled),
            _ => Err(format!("Unknown alarm state: {}", s)),
        }
    }
}

/// The user's answer to a ringing alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Snooze,
    Stop,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Snooze => write!(f, "snooze"),
            Resolution::Stop => write!(f, "stop"),
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "snooze" => Ok(Resolution::Snooze),
            "stop" => Ok(Resolution::Stop),
            _ => Err(format!("Unknown resolution: {}", s)),
        }
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// A scheduled alarm record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: AlarmId,
    /// When the alarm is next due to ring.
    pub fire_at: Timestamp,
    pub vibration_enabled: bool,
    pub state: AlarmState,
    /// How many times this alarm has started ringing. Ring timeouts carry
    /// the count they were armed for so a stale timeout cannot stop a later ring.
    pub ring_count: u32,
    pub created_at: Timestamp,
    /// Set once the alarm is stopped; drives the retention window.
    pub resolved_at: Option<Timestamp>,
}

impl Alarm {
    /// A freshly scheduled alarm.
    pub fn scheduled(
        id: AlarmId,
        fire_at: Timestamp,
        vibration_enabled: bool,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            fire_at,
            vibration_enabled,
            state: AlarmState::Scheduled,
            ring_count: 0,
            created_at,
            resolved_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_state_display_roundtrip() {
        for state in [
            AlarmState::Scheduled,
            AlarmState::Ringing,
            AlarmState::Snoozed,
            AlarmState::Stopped,
            AlarmState::Cancelled,
        ] {
            let parsed: AlarmState = state.to_string().parse().unwrap();
            assert_eq!(parsed, state);
        }
        assert!("asleep".parse::<AlarmState>().is_err());
    }

    #[test]
    fn test_alarm_state_predicates() {
        assert!(AlarmState::Scheduled.is_armed());
        assert!(AlarmState::Snoozed.is_armed());
        assert!(!AlarmState::Ringing.is_armed());
        assert!(!AlarmState::Stopped.is_armed());
    }

    #[test]
    fn test_resolution_parse() {
        assert_eq!("snooze".parse::<Resolution>().unwrap(), Resolution::Snooze);
        assert_eq!("stop".parse::<Resolution>().unwrap(), Resolution::Stop);
        assert!("dismiss".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp(1_000);
        assert_eq!(t.saturating_add(Duration::from_secs(60)), Timestamp(61_000));
        assert_eq!(Timestamp(i64::MAX).saturating_add(Duration::from_millis(1)), Timestamp(i64::MAX));
        assert_eq!(Timestamp(5_000).duration_since(Timestamp(2_000)), Duration::from_millis(3_000));
        assert_eq!(Timestamp(500).duration_since(Timestamp(2_000)), Duration::ZERO);
    }

    #[test]
    fn test_timestamp_datetime_conversion() {
        let t = Timestamp(1_700_000_000_123);
        assert_eq!(t.to_datetime().timestamp_millis(), t.0);
        assert_eq!(Timestamp(i64::MAX).to_datetime().timestamp_millis(), 0);
    }

    #[test]
    fn test_alarm_serializes_transparent_ids() {
        let alarm = Alarm::scheduled(AlarmId(7), Timestamp(1_000), true, Timestamp(10));
        let json = serde_json::to_value(&alarm).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["fire_at"], 1_000);
        assert_eq!(json["state"], "scheduled");
        assert!(json["resolved_at"].is_null());
    }
}
