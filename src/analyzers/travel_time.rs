//! Pairwise travel-time samples and outlier filtering.

use std::collections::BTreeMap;

use crate::analyzers::segment::Trip;
use crate::analyzers::utility::{mean, sample_stddev};
use crate::model::Stop;

pub const DEFAULT_MAX_TRAVEL_SECS: i64 = 7200;
pub const DEFAULT_OUTLIER_SIGMA: f64 = 3.0;

/// Elapsed time between two stops of the same trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TravelTimeSample {
    pub start: Stop,
    pub end: Stop,
    pub seconds: i64,
}

/// Thresholds applied to each (start, end) group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierPolicy {
    /// Samples above this are mis-segmented or stalled trips.
    pub max_seconds: i64,
    /// Width of the keep band around the group mean, in standard deviations.
    pub sigma: f64,
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        Self {
            max_seconds: DEFAULT_MAX_TRAVEL_SECS,
            sigma: DEFAULT_OUTLIER_SIGMA,
        }
    }
}

/// Every ordered pair `(i, j)`, `i < j`, of the trip's events, so any
/// origin/destination pair on the route can be looked up, not just
/// neighbouring stops.
pub fn trip_samples(trip: &Trip) -> Vec<TravelTimeSample> {
    let events = &trip.events;
    let mut samples = Vec::with_capacity(events.len() * events.len().saturating_sub(1) / 2);

    for (i, from) in events.iter().enumerate() {
        for to in &events[i + 1..] {
            samples.push(TravelTimeSample {
                start: from.stop(),
                end: to.stop(),
                seconds: (to.arrival_time - from.arrival_time).num_seconds(),
            });
        }
    }

    samples
}

pub fn samples_for_trips(trips: &[Trip]) -> Vec<TravelTimeSample> {
    trips.iter().flat_map(trip_samples).collect()
}

/// Buckets sample durations by (start, end).
pub fn group_samples(samples: &[TravelTimeSample]) -> BTreeMap<(Stop, Stop), Vec<f64>> {
    let mut groups: BTreeMap<(Stop, Stop), Vec<f64>> = BTreeMap::new();
    for sample in samples {
        groups
            .entry((sample.start.clone(), sample.end.clone()))
            .or_default()
            .push(sample.seconds as f64);
    }
    groups
}

/// Drops samples above the hard cap.
pub fn cap_samples(values: &[f64], policy: &OutlierPolicy) -> Vec<f64> {
    let cap = policy.max_seconds as f64;
    values.iter().copied().filter(|v| *v <= cap).collect()
}

/// A group whose spread is undefined or zero (fewer than two values, all
/// values equal) cannot be judged and gets no statistics. Decided once, on
/// the capped group.
pub fn is_degenerate(values: &[f64]) -> bool {
    match sample_stddev(values, mean(values)) {
        Some(sd) => sd <= 0.0 || !sd.is_finite(),
        None => true,
    }
}

/// One pass of the statistical filter.
///
/// Keeps values within `mean ± sigma·std`. With no spread every value is
/// on the mean, so everything is kept.
pub fn sigma_clip_once(values: &[f64], sigma: f64) -> Vec<f64> {
    let m = mean(values);
    match sample_stddev(values, m) {
        Some(sd) if sd > 0.0 && sd.is_finite() => values
            .iter()
            .copied()
            .filter(|v| (v - m).abs() <= sigma * sd)
            .collect(),
        _ => values.to_vec(),
    }
}

/// Applies the hard cap, then clips until the group is stable.
///
/// The result is a fixed point: filtering it again returns it unchanged.
/// Whether the pair gets statistics at all is [`is_degenerate`]'s call on
/// the capped group.
pub fn filter_outliers(values: &[f64], policy: &OutlierPolicy) -> Vec<f64> {
    let mut kept = cap_samples(values, policy);

    loop {
        let next = sigma_clip_once(&kept, policy.sigma);
        if next.len() == kept.len() {
            return next;
        }
        kept = next;
    }
}
