//! Alarm records and their lifecycle rules.
//!
//! The store is a plain map with no locking and no scheduling logic; the
//! scheduler owns it behind its own mutex.

pub mod state_machine;

use reveille_core::types::{Alarm, AlarmId};
use std::collections::HashMap;

/// Authoritative mapping from alarm id to alarm record.
#[derive(Debug, Default)]
pub struct AlarmStore {
    alarms: HashMap<AlarmId, Alarm>,
}

impl AlarmStore {
    /// Create a new empty AlarmStore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `alarm.id` (last write wins).
    pub fn put(&mut self, alarm: Alarm) {
        self.alarms.insert(alarm.id, alarm);
    }

    pub fn get(&self, id: AlarmId) -> Option<&Alarm> {
        self.alarms.get(&id)
    }

    pub fn get_mut(&mut self, id: AlarmId) -> Option<&mut Alarm> {
        self.alarms.get_mut(&id)
    }

    /// Delete the record for `id`, returning it if it existed.
    pub fn remove(&mut self, id: AlarmId) -> Option<Alarm> {
        self.alarms.remove(&id)
    }

    /// Lazily iterate current records in no particular order.
    ///
    /// The iterator is `Clone`, so a caller can walk the same snapshot twice.
    pub fn all(&self) -> impl Iterator<Item = &Alarm> + Clone + '_ {
        self.alarms.values()
    }

    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }
}
