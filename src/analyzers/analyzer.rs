use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use std::path::Path;
use tracing::{info, warn};

use crate::analyzers::aggregate::aggregate_route;
use crate::analyzers::predict::{PredictorConfig, predict};
use crate::analyzers::profile::arrival_profile;
use crate::analyzers::segment::segment_trips;
use crate::analyzers::travel_time::OutlierPolicy;
use crate::analyzers::types::{Forecast, MinuteCount, TravelTimeTable};
use crate::cache::TravelTimeCache;
use crate::model::{ArrivalEvent, StationKey, Stop};
use crate::output::write_travel_times;
use crate::store::{ArrivalStore, EventFilter};

/// Rebuilds the travel-time table of `route` from the full event history.
#[tracing::instrument(skip(store, policy))]
pub async fn build_travel_times<S>(store: &S, route: &str, policy: &OutlierPolicy) -> Result<TravelTimeTable>
where
    S: ArrivalStore + ?Sized,
{
    let events = store
        .query(&EventFilter::route(route))
        .await
        .with_context(|| format!("loading events for route {route}"))?;
    let trips = segment_trips(&events);

    Ok(aggregate_route(
        route,
        &trips,
        policy,
        Some(Local::now().naive_local()),
    ))
}

/// Writes `<dir>/<route>.csv` for every route that has usable pairs.
/// Returns the number of files written.
pub async fn export_travel_times<S>(
    store: &S,
    routes: &[String],
    policy: &OutlierPolicy,
    dir: &Path,
) -> Result<usize>
where
    S: ArrivalStore + ?Sized,
{
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut written = 0;
    for route in routes {
        let table = build_travel_times(store, route, policy).await?;
        if table.rows.is_empty() {
            warn!(route = %route, "No travel-time pairs yet, skipping export");
            continue;
        }

        let path = dir.join(format!("{route}.csv"));
        write_travel_times(&path, &table)?;
        info!(route = %route, pairs = table.pair_count(), rows = table.rows.len(), path = %path.display(), "Travel times exported");
        written += 1;
    }

    Ok(written)
}

/// Forecasts arrivals at `target` using cached travel-time statistics.
#[tracing::instrument(skip(store, cache, target, config), fields(target = %target))]
pub async fn forecast_wait<S>(
    store: &S,
    cache: &TravelTimeCache,
    target: &StationKey,
    config: &PredictorConfig,
    now: NaiveDateTime,
) -> Result<Forecast>
where
    S: ArrivalStore + ?Sized,
{
    let filter = EventFilter::route(target.route.clone()).since(now - config.window);
    let events = store.query(&filter).await?;
    let table = cache.get(store, &target.route).await?;

    Ok(predict(target, &events, &table, config, now))
}

/// The `limit` most recent events at `stop`, newest first.
pub async fn recent_departures<S>(store: &S, route: &str, stop: &Stop, limit: u32) -> Result<Vec<ArrivalEvent>>
where
    S: ArrivalStore + ?Sized,
{
    let filter = EventFilter::route(route).at_stop(stop).recent(limit);
    Ok(store.query(&filter).await?)
}

/// Per-minute arrival counts at one station across all recorded days.
pub async fn station_profile<S>(store: &S, key: &StationKey) -> Result<Vec<MinuteCount>>
where
    S: ArrivalStore + ?Sized,
{
    let filter = EventFilter::route(key.route.clone()).at_stop(&key.stop());
    let events = store.query(&filter).await?;
    Ok(arrival_profile(&events))
}
