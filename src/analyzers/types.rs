//! Data types produced by the analysis pipeline.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;

use crate::model::Stop;

/// Mean and spread of the filtered travel times for one (start, end) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TravelTimeStats {
    pub mean: f64,
    pub std: f64,
    /// Samples left after outlier filtering.
    pub count: usize,
}

/// One row of the per-route travel-time artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TravelTimeRow {
    pub start_station: String,
    pub start_station_index: u32,
    pub end_station: String,
    pub end_station_index: u32,
    pub travel_time_seconds: i64,
}

/// Filtered samples and their statistics for one route.
#[derive(Debug, Clone, Default)]
pub struct TravelTimeTable {
    pub route: String,
    pub built_at: Option<NaiveDateTime>,
    pub stats: HashMap<(Stop, Stop), TravelTimeStats>,
    pub rows: Vec<TravelTimeRow>,
}

impl TravelTimeTable {
    /// Statistics for `start → end`, or `None` if the pair has no usable data.
    pub fn get(&self, start: &Stop, end: &Stop) -> Option<&TravelTimeStats> {
        self.stats.get(&(start.clone(), end.clone()))
    }

    pub fn pair_count(&self) -> usize {
        self.stats.len()
    }
}

/// Forecast for one bus heading to the target station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictedArrival {
    pub bus_plate: String,
    pub last_station: String,
    pub last_station_index: u32,
    pub last_seen: NaiveDateTime,
    pub predicted: NaiveDateTime,
    pub earliest: NaiveDateTime,
    pub latest: NaiveDateTime,
}

/// Result of a wait-time query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "arrivals", rename_all = "snake_case")]
pub enum Forecast {
    /// No bus upstream with usable statistics.
    NoData,
    /// Ordered by predicted arrival.
    Arrivals(Vec<PredictedArrival>),
}

impl Forecast {
    pub fn arrivals(&self) -> &[PredictedArrival] {
        match self {
            Forecast::NoData => &[],
            Forecast::Arrivals(arrivals) => arrivals,
        }
    }
}

/// Arrivals counted per minute of the day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MinuteCount {
    /// `HH:MM`
    pub minute: String,
    pub count: usize,
}
