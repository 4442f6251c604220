//! Turns per-poll bus statuses into arrival events.
//!
//! The feed reports, for every station of a route, which buses are there and
//! whether each is present (`1`) or has left (`0`). The same status is
//! repeated poll after poll, so an event is only emitted on a *change*:
//!
//! * at the terminus (index 0) a change into `Absent` is a departure. It
//!   also starts a new trip, so every remembered status for that plate is
//!   dropped;
//! * at any other station a change into `Present` is an arrival;
//! * every other change just updates the remembered status.
//!
//! The store append comes first. Remembered state only moves forward once
//! the event is persisted, so a failed write is retried on the next pass.

use chrono::{NaiveDateTime, SubsecRound};
use std::collections::HashMap;
use tracing::{debug, error, info};

use crate::model::{ArrivalEvent, StationKey};
use crate::snapshot::Snapshot;
use crate::status::BusStatus;
use crate::store::ArrivalStore;

/// What a single status report means for one (bus, station).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same status as last time.
    Unchanged,
    /// New status, nothing to record.
    Update,
    /// Left the terminus: emit and reset the plate.
    Depart,
    /// Reached a stop: emit.
    Arrive,
}

/// Classifies `incoming` against the remembered status (`None` if the bus
/// was never seen at this station).
pub fn classify(station_index: u32, previous: Option<BusStatus>, incoming: BusStatus) -> Transition {
    if previous == Some(incoming) {
        return Transition::Unchanged;
    }
    match (station_index, incoming) {
        (0, BusStatus::Absent) => Transition::Depart,
        (i, BusStatus::Present) if i > 0 => Transition::Arrive,
        _ => Transition::Update,
    }
}

/// Remembered statuses and last-seen times, keyed by bus plate.
///
/// Owned by the [`ArrivalDetector`]; the reaper purges it through
/// [`BusState::forget`].
#[derive(Debug, Default)]
pub struct BusState {
    statuses: HashMap<String, HashMap<StationKey, BusStatus>>,
    last_seen: HashMap<String, NaiveDateTime>,
}

impl BusState {
    pub fn status(&self, bus_plate: &str, key: &StationKey) -> Option<BusStatus> {
        self.statuses.get(bus_plate)?.get(key).copied()
    }

    pub fn last_seen(&self, bus_plate: &str) -> Option<NaiveDateTime> {
        self.last_seen.get(bus_plate).copied()
    }

    fn set_status(&mut self, bus_plate: &str, key: StationKey, status: BusStatus, now: NaiveDateTime) {
        self.statuses
            .entry(bus_plate.to_string())
            .or_default()
            .insert(key, status);
        self.last_seen.insert(bus_plate.to_string(), now);
    }

    fn clear_statuses(&mut self, bus_plate: &str) {
        self.statuses.remove(bus_plate);
    }

    /// Drops everything known about `bus_plate`.
    pub fn forget(&mut self, bus_plate: &str) {
        self.statuses.remove(bus_plate);
        self.last_seen.remove(bus_plate);
    }

    /// Plates last seen strictly before `cutoff`.
    pub fn seen_before(&self, cutoff: NaiveDateTime) -> Vec<String> {
        self.last_seen
            .iter()
            .filter(|(_, seen)| **seen < cutoff)
            .map(|(plate, _)| plate.clone())
            .collect()
    }

    /// Number of plates with a last-seen record.
    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }

    /// Number of remembered (plate, station) statuses.
    pub fn entries(&self) -> usize {
        self.statuses.values().map(HashMap::len).sum()
    }
}

/// Outcome of applying one snapshot.
#[derive(Debug, Default)]
pub struct DetectionReport {
    /// Events persisted during this pass.
    pub events: Vec<ArrivalEvent>,
    /// Status changes recorded without an event.
    pub updates: usize,
    /// Transitions whose append failed; they will be retried.
    pub failed: usize,
}

/// Single writer of [`BusState`].
#[derive(Debug, Default)]
pub struct ArrivalDetector {
    state: BusState,
}

impl ArrivalDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &BusState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut BusState {
        &mut self.state
    }

    /// Applies `snapshot` of `route` observed at `now`, appending one event
    /// per qualifying transition to `store`.
    pub async fn process<S>(
        &mut self,
        store: &S,
        route: &str,
        snapshot: &Snapshot,
        now: NaiveDateTime,
    ) -> DetectionReport
    where
        S: ArrivalStore + ?Sized,
    {
        let now = now.trunc_subsecs(0);
        let mut report = DetectionReport::default();

        for (station_index, station) in snapshot.indexed() {
            let key = StationKey::new(route, station.station_code.as_str(), station_index);

            for bus in &station.buses {
                let plate = bus.bus_plate.as_str();
                let previous = self.state.status(plate, &key);

                match classify(station_index, previous, bus.status) {
                    Transition::Unchanged => {}
                    Transition::Update => {
                        self.state.set_status(plate, key.clone(), bus.status, now);
                        report.updates += 1;
                    }
                    transition @ (Transition::Depart | Transition::Arrive) => {
                        let event = ArrivalEvent {
                            route: route.to_string(),
                            bus_plate: plate.to_string(),
                            station_code: station.station_code.clone(),
                            station_index,
                            arrival_time: now,
                        };

                        if let Err(e) = store.append(&event).await {
                            error!(
                                route,
                                bus_plate = plate,
                                station = %key,
                                error = %e,
                                "Failed to persist arrival, will retry next pass"
                            );
                            report.failed += 1;
                            continue;
                        }

                        if transition == Transition::Depart {
                            self.state.clear_statuses(plate);
                            info!(route, bus_plate = plate, station = %event.stop(), time = %event.formatted_time(), "Departure from terminus");
                        } else {
                            debug!(route, bus_plate = plate, station = %event.stop(), "Arrival");
                        }
                        self.state.set_status(plate, key.clone(), bus.status, now);
                        report.events.push(event);
                    }
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{BusReport, StationSnapshot};
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, TimeDelta};

    const STATIONS: [&str; 4] = ["T530", "M11/1", "M12", "M13"];

    fn t(secs: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 10, 5)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
            + TimeDelta::seconds(secs)
    }

    /// Snapshot with `plate` reporting `status` at `index`, all other
    /// stations empty.
    fn snap(reports: &[(u32, &str, &str)]) -> Snapshot {
        let mut stations: Vec<StationSnapshot> = STATIONS
            .iter()
            .map(|code| StationSnapshot {
                station_code: code.to_string(),
                buses: vec![],
            })
            .collect();
        for (index, plate, status) in reports {
            stations[*index as usize]
                .buses
                .push(BusReport::new(*plate, BusStatus::from_feed(status)));
        }
        Snapshot { stations }
    }

    #[test]
    fn test_classify_table() {
        use BusStatus::*;
        assert_eq!(classify(0, None, Absent), Transition::Depart);
        assert_eq!(classify(0, Some(Present), Absent), Transition::Depart);
        assert_eq!(classify(0, Some(Absent), Absent), Transition::Unchanged);
        assert_eq!(classify(0, Some(Absent), Present), Transition::Update);
        assert_eq!(classify(3, None, Present), Transition::Arrive);
        assert_eq!(classify(3, Some(Absent), Present), Transition::Arrive);
        assert_eq!(classify(3, Some(Unknown), Present), Transition::Arrive);
        assert_eq!(classify(3, Some(Present), Present), Transition::Unchanged);
        assert_eq!(classify(3, Some(Present), Absent), Transition::Update);
        assert_eq!(classify(3, None, Unknown), Transition::Update);
    }

    #[tokio::test]
    async fn test_repeated_departure_reports_emit_once() {
        let store = MemoryStore::new();
        let mut detector = ArrivalDetector::new();

        detector.process(&store, "73", &snap(&[(0, "X1", "1")]), t(0)).await;
        for i in 1..5 {
            detector.process(&store, "73", &snap(&[(0, "X1", "0")]), t(i * 5)).await;
        }

        let events = store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].station_index, 0);
        assert_eq!(events[0].arrival_time, t(5));
    }

    #[tokio::test]
    async fn test_index_zero_events_match_transitions_into_absent() {
        let store = MemoryStore::new();
        let mut detector = ArrivalDetector::new();
        let sequence = ["1", "0", "0", "1", "1", "0", "2", "0", "0", "1", "0"];

        let mut expected = 0;
        let mut previous: Option<&str> = None;
        for (i, status) in sequence.iter().enumerate() {
            if *status == "0" && previous != Some("0") {
                expected += 1;
            }
            previous = Some(status);
            detector
                .process(&store, "73", &snap(&[(0, "X1", status)]), t(i as i64 * 5))
                .await;
        }

        assert_eq!(expected, 4);
        assert_eq!(store.len(), expected);
    }

    #[tokio::test]
    async fn test_intermediate_station_emits_only_into_present() {
        let store = MemoryStore::new();
        let mut detector = ArrivalDetector::new();

        for (i, status) in ["0", "0", "1", "1", "0", "2", "1"].iter().enumerate() {
            detector
                .process(&store, "73", &snap(&[(2, "X1", status)]), t(i as i64 * 5))
                .await;
        }

        let times: Vec<_> = store.events().iter().map(|e| e.arrival_time).collect();
        assert_eq!(times, vec![t(10), t(30)]);
        assert!(store.events().iter().all(|e| e.station_index == 2));
    }

    #[tokio::test]
    async fn test_departure_resets_plate_state() {
        let store = MemoryStore::new();
        let mut detector = ArrivalDetector::new();

        detector.process(&store, "73", &snap(&[(2, "X1", "1")]), t(0)).await;
        detector.process(&store, "73", &snap(&[(0, "X1", "0")]), t(5)).await;

        let key = StationKey::new("73", "M12", 2);
        assert_eq!(detector.state().status("X1", &key), None);
        assert_eq!(detector.state().entries(), 1);

        // Same status as before the reset counts as a fresh arrival.
        detector.process(&store, "73", &snap(&[(2, "X1", "1")]), t(10)).await;
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_absent_bus_is_not_a_change() {
        let store = MemoryStore::new();
        let mut detector = ArrivalDetector::new();

        detector.process(&store, "73", &snap(&[(1, "X1", "1")]), t(0)).await;
        detector.process(&store, "73", &snap(&[]), t(5)).await;
        detector.process(&store, "73", &snap(&[(1, "X1", "1")]), t(10)).await;

        assert_eq!(store.len(), 1);
        assert_eq!(detector.state().last_seen("X1"), Some(t(0)));
    }

    #[tokio::test]
    async fn test_last_seen_moves_on_any_change() {
        let store = MemoryStore::new();
        let mut detector = ArrivalDetector::new();

        detector.process(&store, "73", &snap(&[(1, "X1", "0")]), t(0)).await;
        detector.process(&store, "73", &snap(&[(1, "X1", "0")]), t(5)).await;
        assert_eq!(detector.state().last_seen("X1"), Some(t(0)));

        let report = detector.process(&store, "73", &snap(&[(1, "X1", "9")]), t(10)).await;
        assert_eq!(report.updates, 1);
        assert!(report.events.is_empty());
        assert_eq!(detector.state().last_seen("X1"), Some(t(10)));
    }

    #[tokio::test]
    async fn test_failed_append_is_retried() {
        let store = MemoryStore::new();
        let mut detector = ArrivalDetector::new();

        detector.process(&store, "73", &snap(&[(1, "X1", "0")]), t(0)).await;

        store.set_failing(true);
        let report = detector.process(&store, "73", &snap(&[(1, "X1", "1")]), t(5)).await;
        assert_eq!(report.failed, 1);
        assert!(store.is_empty());
        let key = StationKey::new("73", "M11/1", 1);
        assert_eq!(detector.state().status("X1", &key), Some(BusStatus::Absent));
        assert_eq!(detector.state().last_seen("X1"), Some(t(0)));

        store.set_failing(false);
        let report = detector.process(&store, "73", &snap(&[(1, "X1", "1")]), t(10)).await;
        assert_eq!(report.events.len(), 1);
        assert_eq!(store.events()[0].arrival_time, t(10));
        assert_eq!(detector.state().status("X1", &key), Some(BusStatus::Present));
    }

    #[tokio::test]
    async fn test_failed_departure_keeps_trip_state() {
        let store = MemoryStore::new();
        let mut detector = ArrivalDetector::new();

        detector
            .process(&store, "73", &snap(&[(0, "X1", "1"), (2, "X1", "1")]), t(0))
            .await;
        let before = detector.state().entries();

        store.set_failing(true);
        detector.process(&store, "73", &snap(&[(0, "X1", "0")]), t(5)).await;
        assert_eq!(detector.state().entries(), before);

        store.set_failing(false);
        detector.process(&store, "73", &snap(&[(0, "X1", "0")]), t(10)).await;
        assert_eq!(detector.state().entries(), 1);
        assert_eq!(store.events().last().map(|e| e.arrival_time), Some(t(10)));
    }

    #[tokio::test]
    async fn test_event_times_are_whole_seconds() {
        let store = MemoryStore::new();
        let mut detector = ArrivalDetector::new();
        let now = t(0) + TimeDelta::milliseconds(750);

        detector.process(&store, "73", &snap(&[(1, "X1", "1")]), now).await;

        assert_eq!(store.events()[0].arrival_time, t(0));
    }
}
