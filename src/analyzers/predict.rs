//! Wait-time forecasts for a target station.
//!
//! Each bus's latest event tells where it was last seen. Buses still
//! upstream of the target are projected forward by the mean travel time
//! from that stop, with a `band_sigma`-wide confidence band. The default
//! 2σ band is narrower than the 3σ outlier filter because short hops close
//! to the target cluster tightly.

use chrono::{NaiveDateTime, TimeDelta};
use std::collections::HashMap;

use crate::analyzers::types::{Forecast, PredictedArrival, TravelTimeTable};
use crate::model::{ArrivalEvent, StationKey};

pub const DEFAULT_WINDOW_MINUTES: i64 = 120;
pub const DEFAULT_BAND_SIGMA: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorConfig {
    /// Only positions at most this old are considered.
    pub window: TimeDelta,
    pub band_sigma: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            window: TimeDelta::minutes(DEFAULT_WINDOW_MINUTES),
            band_sigma: DEFAULT_BAND_SIGMA,
        }
    }
}

fn offset(seconds: f64) -> TimeDelta {
    TimeDelta::milliseconds((seconds * 1000.0).round() as i64)
}

/// Latest event per bus on `route` at or after `since`.
fn latest_positions<'a>(
    events: &'a [ArrivalEvent],
    route: &str,
    since: NaiveDateTime,
) -> HashMap<&'a str, &'a ArrivalEvent> {
    let mut latest: HashMap<&str, &ArrivalEvent> = HashMap::new();
    for event in events
        .iter()
        .filter(|e| e.route == route && e.arrival_time >= since)
    {
        latest
            .entry(event.bus_plate.as_str())
            .and_modify(|current| {
                if (event.arrival_time, event.station_index) > (current.arrival_time, current.station_index) {
                    *current = event;
                }
            })
            .or_insert(event);
    }
    latest
}

/// Forecasts arrivals at `target` from recent `events` and travel-time
/// statistics. Buses with no statistics from their last stop are skipped.
pub fn predict(
    target: &StationKey,
    events: &[ArrivalEvent],
    table: &TravelTimeTable,
    config: &PredictorConfig,
    now: NaiveDateTime,
) -> Forecast {
    let target_stop = target.stop();

    let mut arrivals: Vec<PredictedArrival> = latest_positions(events, &target.route, now - config.window)
        .into_values()
        .filter(|e| e.station_index < target.station_index)
        .filter_map(|e| {
            let stats = table.get(&e.stop(), &target_stop)?;
            let spread = config.band_sigma * stats.std;
            Some(PredictedArrival {
                bus_plate: e.bus_plate.clone(),
                last_station: e.station_code.clone(),
                last_station_index: e.station_index,
                last_seen: e.arrival_time,
                predicted: e.arrival_time + offset(stats.mean),
                earliest: e.arrival_time + offset(stats.mean - spread),
                latest: e.arrival_time + offset(stats.mean + spread),
            })
        })
        .collect();

    if arrivals.is_empty() {
        return Forecast::NoData;
    }

    arrivals.sort_by(|a, b| (a.predicted, &a.bus_plate).cmp(&(b.predicted, &b.bus_plate)));
    Forecast::Arrivals(arrivals)
}
