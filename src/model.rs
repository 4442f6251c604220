//! Core records shared by ingestion and analysis.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage format for arrival timestamps.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One stop on one route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationKey {
    pub route: String,
    pub station_code: String,
    pub station_index: u32,
}

impl StationKey {
    pub fn new(route: impl Into<String>, station_code: impl Into<String>, station_index: u32) -> Self {
        Self {
            route: route.into(),
            station_code: station_code.into(),
            station_index,
        }
    }

    /// The route-local part of the key.
    pub fn stop(&self) -> Stop {
        Stop::new(self.station_code.clone(), self.station_index)
    }
}

impl fmt::Display for StationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.route, self.stop())
    }
}

/// A stop identified within a single route.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stop {
    pub station_code: String,
    pub station_index: u32,
}

impl Stop {
    pub fn new(station_code: impl Into<String>, station_index: u32) -> Self {
        Self {
            station_code: station_code.into(),
            station_index,
        }
    }
}

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.station_index, self.station_code)
    }
}

/// A bus reaching a stop (or, at index 0, leaving the terminus).
///
/// Events are append-only: once written to the store they are never
/// updated or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrivalEvent {
    pub route: String,
    pub bus_plate: String,
    pub station_code: String,
    pub station_index: u32,
    pub arrival_time: NaiveDateTime,
}

impl ArrivalEvent {
    pub fn stop(&self) -> Stop {
        Stop::new(self.station_code.clone(), self.station_index)
    }

    /// Arrival time in the persisted text layout.
    pub fn formatted_time(&self) -> String {
        self.arrival_time.format(TIME_FORMAT).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_formatted_time_drops_subseconds() {
        let event = ArrivalEvent {
            route: "73S".to_string(),
            bus_plate: "MX1234".to_string(),
            station_code: "T530/1".to_string(),
            station_index: 2,
            arrival_time: NaiveDate::from_ymd_opt(2023, 10, 5)
                .unwrap()
                .and_hms_milli_opt(14, 7, 46, 250)
                .unwrap(),
        };

        assert_eq!(event.formatted_time(), "2023-10-05 14:07:46");
    }

    #[test]
    fn test_station_key_display() {
        let key = StationKey::new("71", "M11/1", 4);
        assert_eq!(key.to_string(), "71:[4] M11/1");
        assert_eq!(key.stop(), Stop::new("M11/1", 4));
    }
}
