//! Eviction of buses that dropped out of the feed.
//!
//! A bus that finishes service, changes route or goes offline stops
//! appearing in snapshots. Its remembered statuses would otherwise linger
//! forever and could mask the next terminus departure under the same plate.

use chrono::{NaiveDateTime, TimeDelta};
use tracing::{debug, info};

use crate::detector::BusState;

pub const DEFAULT_STALE_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy)]
pub struct Reaper {
    threshold: TimeDelta,
}

impl Default for Reaper {
    fn default() -> Self {
        Self::new(TimeDelta::minutes(DEFAULT_STALE_MINUTES))
    }
}

impl Reaper {
    pub fn new(threshold: TimeDelta) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> TimeDelta {
        self.threshold
    }

    /// Forgets every plate whose last status change is older than the
    /// threshold. Returns the reaped plates.
    pub fn reap(&self, state: &mut BusState, now: NaiveDateTime) -> Vec<String> {
        let cutoff = now - self.threshold;
        let stale = state.seen_before(cutoff);

        for plate in &stale {
            debug!(bus_plate = %plate, "Reaping stale bus state");
            state.forget(plate);
        }

        if !stale.is_empty() {
            info!(reaped = stale.len(), remaining = state.tracked(), "Stale bus state reaped");
        }
        stale
    }
}
