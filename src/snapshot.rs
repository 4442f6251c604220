//! One poll's view of a route.

use crate::status::BusStatus;

/// A bus reported at a station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusReport {
    pub bus_plate: String,
    pub status: BusStatus,
}

impl BusReport {
    pub fn new(bus_plate: impl Into<String>, status: BusStatus) -> Self {
        Self {
            bus_plate: bus_plate.into(),
            status,
        }
    }
}

/// A station in route order, with the buses currently reported there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationSnapshot {
    pub station_code: String,
    pub buses: Vec<BusReport>,
}

/// Ordered stations of one route. The position of a station in
/// `stations` is its station index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub stations: Vec<StationSnapshot>,
}

impl Snapshot {
    /// Iterates `(station_index, station)` in route order.
    pub fn indexed(&self) -> impl Iterator<Item = (u32, &StationSnapshot)> {
        self.stations
            .iter()
            .enumerate()
            .map(|(i, s)| (i as u32, s))
    }

    pub fn bus_count(&self) -> usize {
        self.stations.iter().map(|s| s.buses.len()).sum()
    }
}
