use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{Result, VpdError};
use crate::types::ActuatorKind;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub actuator: ActuatorKind,
    pub desired_state: bool,
    pub set_at: DateTime<Utc>,
}

/// An active override as reported to the status surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideStatus {
    pub actuator: ActuatorKind,
    pub desired_state: bool,
    pub set_at: DateTime<Utc>,
    pub remaining_secs: u64,
}

/// Manually requested actuator states with a time-to-live.
///
/// Shared between the control loop and the API; a single mutex guards the
/// record map. Expired records are purged on read.
#[derive(Debug)]
pub struct OverrideTracker {
    ttl: Duration,
    records: Mutex<HashMap<ActuatorKind, OverrideRecord>>,
}

impl OverrideTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ActuatorKind, OverrideRecord>> {
        // The map holds plain values; a panic elsewhere cannot leave it torn.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn expired(&self, record: &OverrideRecord, now: DateTime<Utc>) -> bool {
        match (now - record.set_at).to_std() {
            Ok(elapsed) => elapsed >= self.ttl,
            // set_at in the future: clock stepped backwards, keep the record
            Err(_) => false,
        }
    }

    pub fn set_override(&self, actuator: ActuatorKind, desired_state: bool, now: DateTime<Utc>) {
        self.lock().insert(
            actuator,
            OverrideRecord {
                actuator,
                desired_state,
                set_at: now,
            },
        );
    }

    /// Like [`set_override`](Self::set_override), but refuses to lock the
    /// humidifier and dehumidifier ON at the same time.
    pub fn set_override_checked(
        &self,
        actuator: ActuatorKind,
        desired_state: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let opposite = match actuator {
            ActuatorKind::Humidifier => Some(ActuatorKind::Dehumidifier),
            ActuatorKind::Dehumidifier => Some(ActuatorKind::Humidifier),
            ActuatorKind::Exhaust => None,
        };
        // check and insert under one guard
        let mut records = self.lock();
        if let (true, Some(other)) = (desired_state, opposite) {
            let other_on = records
                .get(&other)
                .filter(|r| !self.expired(r, now))
                .is_some_and(|r| r.desired_state);
            if other_on {
                return Err(VpdError::OverrideConflict(format!(
                    "{other} is override-locked on; clear it before forcing {actuator} on"
                )));
            }
        }
        records.insert(
            actuator,
            OverrideRecord {
                actuator,
                desired_state,
                set_at: now,
            },
        );
        Ok(())
    }

    pub fn is_active(&self, actuator: ActuatorKind, now: DateTime<Utc>) -> bool {
        self.get(actuator, now).is_some()
    }

    /// The live record for `actuator`, purging it if its TTL has elapsed.
    pub fn get(&self, actuator: ActuatorKind, now: DateTime<Utc>) -> Option<OverrideRecord> {
        let mut records = self.lock();
        let record = *records.get(&actuator)?;
        if self.expired(&record, now) {
            records.remove(&actuator);
            tracing::info!(actuator = %actuator, "override expired");
            return None;
        }
        Some(record)
    }

    pub fn desired(&self, actuator: ActuatorKind, now: DateTime<Utc>) -> Option<bool> {
        self.get(actuator, now).map(|r| r.desired_state)
    }

    /// Returns true if a record was removed.
    pub fn clear(&self, actuator: ActuatorKind) -> bool {
        self.lock().remove(&actuator).is_some()
    }

    /// All live overrides in actuator order, purging expired ones.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Vec<OverrideStatus> {
        let mut records = self.lock();
        records.retain(|_, r| !self.expired(r, now));
        let mut out: Vec<OverrideStatus> = records
            .values()
            .map(|r| {
                let elapsed = (now - r.set_at).to_std().unwrap_or_default();
                OverrideStatus {
                    actuator: r.actuator,
                    desired_state: r.desired_state,
                    set_at: r.set_at,
                    remaining_secs: self.ttl.saturating_sub(elapsed).as_secs(),
                }
            })
            .collect();
        out.sort_by_key(|s| s.actuator);
        out
    }
}
