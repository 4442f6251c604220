//! Runtime settings shared by every subcommand.
//!
//! Every option can come from the command line or from the environment
//! (including a `.env` file loaded at startup).

use chrono::TimeDelta;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::analyzers::predict::PredictorConfig;
use crate::analyzers::travel_time::OutlierPolicy;
use crate::cache::CacheConfig;
use crate::collector::CollectorConfig;
use crate::fetch::DSAT_URL;
use crate::reaper::Reaper;

pub const DEFAULT_ROUTES: [&str; 6] = ["701X", "71", "72", "73", "73S", "N6"];

/// Upper bound for minute-valued options: one week.
const MAX_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// SQLite database holding arrival events
    #[arg(long, env = "BUS_DB_PATH", default_value = "data/bus_data.db", global = true)]
    pub database: PathBuf,

    /// Routes to poll or analyse, comma separated
    #[arg(
        long,
        env = "BUS_ROUTES",
        value_delimiter = ',',
        default_values_t = DEFAULT_ROUTES.map(String::from),
        global = true
    )]
    pub routes: Vec<String>,

    /// Real-time feed endpoint
    #[arg(long, env = "BUS_FEED_URL", default_value = DSAT_URL, global = true)]
    pub feed_url: String,

    /// Seconds between poll cycles
    #[arg(long, env = "BUS_POLL_INTERVAL_SECS", default_value_t = 5, global = true)]
    pub poll_interval_secs: u64,

    /// Seconds before a single route fetch is abandoned
    #[arg(long, env = "BUS_FETCH_TIMEOUT_SECS", default_value_t = 10, global = true)]
    pub fetch_timeout_secs: u64,

    /// Minutes without a sighting before a bus's state is dropped
    #[arg(
        long,
        env = "BUS_STALE_MINUTES",
        default_value_t = 30,
        value_parser = clap::value_parser!(u32).range(1..=MAX_MINUTES),
        global = true
    )]
    pub stale_minutes: u32,

    /// Maximum number of route fetches in flight
    #[arg(long, env = "BUS_FETCH_CONCURRENCY", default_value_t = 8, global = true)]
    pub concurrency: usize,

    /// Minutes of recent positions considered by the predictor
    #[arg(
        long,
        env = "BUS_WAIT_WINDOW_MINUTES",
        default_value_t = 120,
        value_parser = clap::value_parser!(u32).range(1..=MAX_MINUTES),
        global = true
    )]
    pub wait_window_minutes: u32,

    /// Travel-time samples above this many seconds are discarded
    #[arg(long, env = "BUS_MAX_TRAVEL_SECS", default_value_t = 7200, global = true)]
    pub max_travel_secs: i64,

    /// Outlier clipping width in standard deviations
    #[arg(long, env = "BUS_OUTLIER_SIGMA", default_value_t = 3.0, global = true)]
    pub outlier_sigma: f64,

    /// Prediction band width in standard deviations
    #[arg(long, env = "BUS_BAND_SIGMA", default_value_t = 2.0, global = true)]
    pub band_sigma: f64,

    /// Seconds between travel-time rebuilds
    #[arg(long, env = "BUS_STATS_REFRESH_SECS", default_value_t = 600, global = true)]
    pub stats_refresh_secs: u64,

    /// Directory receiving one travel-time CSV per route
    #[arg(long, env = "BUS_TRAVEL_TIME_DIR", default_value = "data/travel_time", global = true)]
    pub travel_time_dir: PathBuf,
}

impl Settings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn stats_refresh(&self) -> Duration {
        Duration::from_secs(self.stats_refresh_secs.max(1))
    }

    pub fn reaper(&self) -> Reaper {
        Reaper::new(TimeDelta::minutes(i64::from(self.stale_minutes)))
    }

    pub fn outlier_policy(&self) -> OutlierPolicy {
        OutlierPolicy {
            max_seconds: self.max_travel_secs,
            sigma: self.outlier_sigma,
        }
    }

    pub fn predictor(&self) -> PredictorConfig {
        PredictorConfig {
            window: TimeDelta::minutes(i64::from(self.wait_window_minutes)),
            band_sigma: self.band_sigma,
        }
    }

    pub fn cache(&self) -> CacheConfig {
        CacheConfig {
            ttl: self.stats_refresh(),
            ..Default::default()
        }
    }

    pub fn collector(&self, max_cycles: usize) -> CollectorConfig {
        CollectorConfig {
            routes: self.routes.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            fetch_timeout: self.fetch_timeout(),
            concurrency: self.concurrency,
            max_cycles,
        }
    }
}
