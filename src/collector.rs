//! The polling loop: fetch every route, detect arrivals, reap stale state.
//!
//! Fetches fan out concurrently. Detection then runs on this task alone, so
//! the bus state has a single writer even when a plate shows up on two
//! routes in the same cycle. Shutdown is only observed between cycles; a
//! cycle that has started always finishes its detection and persistence.

use chrono::{Local, NaiveDateTime};
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tracing::{Instrument, debug, error, info, warn};

use crate::detector::ArrivalDetector;
use crate::fetch::{FeedClient, FeedError};
use crate::reaper::Reaper;
use crate::snapshot::Snapshot;
use crate::store::ArrivalStore;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub routes: Vec<String>,
    pub poll_interval: Duration,
    /// Upper bound on a single route fetch.
    pub fetch_timeout: Duration,
    /// Maximum number of route fetches in flight.
    pub concurrency: usize,
    /// Stop after this many cycles (0 = run until shut down).
    pub max_cycles: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            concurrency: 8,
            max_cycles: 0,
        }
    }
}

/// Counters for one poll cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub routes_ok: usize,
    pub routes_failed: usize,
    pub events: usize,
    pub updates: usize,
    pub failed_appends: usize,
    pub reaped: usize,
}

struct Fetched {
    route: String,
    received_at: NaiveDateTime,
    result: Result<Snapshot, FeedError>,
}

pub struct Collector<F, S> {
    feed: F,
    store: S,
    detector: ArrivalDetector,
    reaper: Reaper,
    config: CollectorConfig,
}

impl<F: FeedClient, S: ArrivalStore> Collector<F, S> {
    pub fn new(feed: F, store: S, reaper: Reaper, config: CollectorConfig) -> Self {
        Self {
            feed,
            store,
            detector: ArrivalDetector::new(),
            reaper,
            config,
        }
    }

    pub fn detector(&self) -> &ArrivalDetector {
        &self.detector
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn fetch_route(&self, route: &str, permits: &Semaphore) -> Fetched {
        let _permit = permits.acquire().await;

        let started = std::time::Instant::now();
        let result = match tokio::time::timeout(self.config.fetch_timeout, self.feed.fetch(route)).await {
            Ok(result) => result,
            Err(_) => Err(FeedError::Timeout(self.config.fetch_timeout)),
        };
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, ok = result.is_ok(), "Route fetched");

        Fetched {
            route: route.to_string(),
            received_at: Local::now().naive_local(),
            result,
        }
    }

    /// Runs one full cycle over all configured routes.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let permits = Semaphore::new(self.config.concurrency.max(1));
        let fetched = join_all(self.config.routes.iter().map(|route| {
            let span = tracing::info_span!("fetch_route", route = %route);
            self.fetch_route(route, &permits).instrument(span)
        }))
        .await;

        let mut report = CycleReport::default();
        for Fetched {
            route,
            received_at,
            result,
        } in fetched
        {
            match result {
                Ok(snapshot) => {
                    let detection = self
                        .detector
                        .process(&self.store, &route, &snapshot, received_at)
                        .await;
                    report.routes_ok += 1;
                    report.events += detection.events.len();
                    report.updates += detection.updates;
                    report.failed_appends += detection.failed;
                }
                Err(e) if e.is_malformed() => {
                    warn!(route = %route, error = %e, "Malformed snapshot, no update this cycle");
                    report.routes_failed += 1;
                }
                Err(e) => {
                    error!(route = %route, error = %e, "Failed to fetch route");
                    report.routes_failed += 1;
                }
            }
        }

        let now = Local::now().naive_local();
        report.reaped = self.reaper.reap(self.detector.state_mut(), now).len();
        report
    }

    /// Polls until `shutdown` flips to `true` (or its sender is dropped), or
    /// until `max_cycles` cycles have run. Returns the number of cycles.
    #[tracing::instrument(skip_all, fields(routes = self.config.routes.len()))]
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> usize {
        info!(
            interval_secs = self.config.poll_interval.as_secs_f64(),
            "Starting collection"
        );

        let mut cycles = 0;
        loop {
            let report = self.run_cycle().await;
            cycles += 1;
            info!(
                cycle = cycles,
                routes_ok = report.routes_ok,
                routes_failed = report.routes_failed,
                events = report.events,
                failed_appends = report.failed_appends,
                reaped = report.reaped,
                tracked = self.detector.state().tracked(),
                "Cycle complete"
            );

            if self.config.max_cycles > 0 && cycles >= self.config.max_cycles {
                break;
            }
            if *shutdown.borrow_and_update() {
                info!("Shutdown requested");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        info!(cycles, "Collection stopped");
        cycles
    }
}
