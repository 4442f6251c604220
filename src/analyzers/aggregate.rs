use chrono::NaiveDateTime;
use std::collections::HashMap;
use tracing::debug;

use crate::analyzers::segment::Trip;
use crate::analyzers::travel_time::{
    OutlierPolicy, cap_samples, filter_outliers, group_samples, is_degenerate, samples_for_trips,
};
use crate::analyzers::types::{TravelTimeRow, TravelTimeStats, TravelTimeTable};
use crate::analyzers::utility::{mean, sample_stddev};

/// Aggregates the trips of one route into a [`TravelTimeTable`].
///
/// Each (start, end) group is filtered with `policy`. Groups that are
/// degenerate after the hard cap get no statistics and no rows.
pub fn aggregate_route(
    route: &str,
    trips: &[Trip],
    policy: &OutlierPolicy,
    built_at: Option<NaiveDateTime>,
) -> TravelTimeTable {
    let groups = group_samples(&samples_for_trips(trips));

    let mut stats = HashMap::new();
    let mut rows = Vec::new();
    let mut dropped_pairs = 0usize;

    for ((start, end), values) in groups {
        if is_degenerate(&cap_samples(&values, policy)) {
            dropped_pairs += 1;
            continue;
        }

        let kept = filter_outliers(&values, policy);
        let avg = mean(&kept);
        let Some(sd) = sample_stddev(&kept, avg) else {
            dropped_pairs += 1;
            continue;
        };

        rows.extend(kept.iter().map(|secs| TravelTimeRow {
            start_station: start.station_code.clone(),
            start_station_index: start.station_index,
            end_station: end.station_code.clone(),
            end_station_index: end.station_index,
            travel_time_seconds: *secs as i64,
        }));

        stats.insert(
            (start, end),
            TravelTimeStats {
                mean: avg,
                std: sd,
                count: kept.len(),
            },
        );
    }

    debug!(
        route,
        trips = trips.len(),
        pairs = stats.len(),
        dropped_pairs,
        "Travel times aggregated"
    );

    TravelTimeTable {
        route: route.to_string(),
        built_at,
        stats,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArrivalEvent, Stop};
    use chrono::{NaiveDate, TimeDelta};

    fn trip(id: u64, secs: &[i64]) -> Trip {
        let base = NaiveDate::from_ymd_opt(2023, 10, 5)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
            + TimeDelta::hours(id as i64);
        Trip {
            trip_id: id,
            bus_plate: "X1".to_string(),
            events: secs
                .iter()
                .enumerate()
                .map(|(i, s)| ArrivalEvent {
                    route: "73".to_string(),
                    bus_plate: "X1".to_string(),
                    station_code: format!("S{i}"),
                    station_index: i as u32,
                    arrival_time: base + TimeDelta::seconds(*s),
                })
                .collect(),
        }
    }

    #[test]
    fn test_aggregate_route_stats() {
        let trips = vec![trip(0, &[0, 100]), trip(1, &[0, 140]), trip(2, &[0, 120])];

        let table = aggregate_route("73", &trips, &OutlierPolicy::default(), None);

        let stats = table.get(&Stop::new("S0", 0), &Stop::new("S1", 1)).unwrap();
        assert_eq!(stats.mean, 120.0);
        assert_eq!(stats.std, 20.0);
        assert_eq!(stats.count, 3);
        assert_eq!(table.rows.len(), 3);
    }

    #[test]
    fn test_single_sample_pair_has_no_stats() {
        let trips = vec![trip(0, &[0, 100, 160]), trip(1, &[0, 120])];

        let table = aggregate_route("73", &trips, &OutlierPolicy::default(), None);

        assert!(table.get(&Stop::new("S0", 0), &Stop::new("S1", 1)).is_some());
        assert!(table.get(&Stop::new("S0", 0), &Stop::new("S2", 2)).is_none());
        assert!(table.get(&Stop::new("S1", 1), &Stop::new("S2", 2)).is_none());
        assert_eq!(table.pair_count(), 1);
        assert!(table.rows.iter().all(|r| r.end_station_index == 1));
    }

    #[test]
    fn test_clustered_pair_keeps_stats() {
        let mut trips: Vec<Trip> = (0..20).map(|id| trip(id, &[0, 120])).collect();
        trips.push(trip(20, &[0, 125]));
        trips.push(trip(21, &[0, 130]));

        let table = aggregate_route("73", &trips, &OutlierPolicy::default(), None);

        let stats = table.get(&Stop::new("S0", 0), &Stop::new("S1", 1)).unwrap();
        assert_eq!(stats.mean, 120.0);
        assert_eq!(stats.std, 0.0);
        assert_eq!(stats.count, 20);
        assert_eq!(table.rows.len(), 20);
    }

    #[test]
    fn test_identical_samples_have_no_stats() {
        let trips: Vec<Trip> = (0..5).map(|id| trip(id, &[0, 90])).collect();

        let table = aggregate_route("73", &trips, &OutlierPolicy::default(), None);

        assert_eq!(table.pair_count(), 0);
        assert!(table.rows.is_empty());
    }
}
