//! CLI entry point for the bus tracker.
//!
//! `collect` polls the live feed and records arrivals; the other subcommands
//! query the recorded history.

use anyhow::{Context, Result};
use bus_tracker::analyzers::analyzer::{export_travel_times, forecast_wait, recent_departures, station_profile};
use bus_tracker::analyzers::travel_time::OutlierPolicy;
use bus_tracker::cache::TravelTimeCache;
use bus_tracker::collector::Collector;
use bus_tracker::config::Settings;
use bus_tracker::fetch::{BasicClient, DsatFeed};
use bus_tracker::model::{StationKey, Stop};
use bus_tracker::output::print_json;
use bus_tracker::store::{ArrivalStore, SqliteStore};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bus_tracker")]
#[command(about = "Detects bus arrivals and estimates travel and wait times", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StationArgs {
    /// Route name, e.g. 73
    route: String,

    /// Station code as reported by the feed
    station_code: String,

    /// Position of the station along the route (0 = terminus)
    station_index: u32,
}

impl StationArgs {
    fn key(&self) -> StationKey {
        StationKey::new(&self.route, &self.station_code, self.station_index)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the live feed and record arrival events until Ctrl+C
    Collect {
        /// Number of poll cycles to run (0 = infinite)
        #[arg(short = 'n', long, default_value_t = 0)]
        max_cycles: usize,
    },
    /// Rebuild the per-route travel-time CSVs once
    TravelTimes,
    /// Forecast bus arrivals at a station
    Predict {
        #[command(flatten)]
        station: StationArgs,
    },
    /// Show the most recent arrivals at a station
    Departures {
        #[command(flatten)]
        station: StationArgs,

        #[arg(short, long, default_value_t = 3)]
        limit: u32,
    },
    /// Per-minute arrival counts at a station
    Profile {
        #[command(flatten)]
        station: StationArgs,
    },
    /// List recorded routes and their stops
    Routes,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/bus_tracker.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bus_tracker.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings;

    let store = open_store(&settings.database).await?;

    let result = match cli.command {
        Commands::Collect { max_cycles } => collect(&settings, store.clone(), max_cycles).await,
        Commands::TravelTimes => {
            let written = export_travel_times(
                &store,
                &settings.routes,
                &settings.outlier_policy(),
                &settings.travel_time_dir,
            )
            .await?;
            info!(written, dir = %settings.travel_time_dir.display(), "Travel times rebuilt");
            Ok(())
        }
        Commands::Predict { station } => {
            let key = station.key();
            let cache = TravelTimeCache::new(&settings.cache(), settings.outlier_policy());
            let forecast = forecast_wait(
                &store,
                &cache,
                &key,
                &settings.predictor(),
                Local::now().naive_local(),
            )
            .await?;

            if forecast.arrivals().is_empty() {
                warn!(station = %key, "No buses with usable statistics are approaching");
            }
            print_json(&forecast)
        }
        Commands::Departures { station, limit } => {
            let key = station.key();
            let events = recent_departures(&store, &key.route, &key.stop(), limit).await?;
            print_json(&events)
        }
        Commands::Profile { station } => {
            let profile = station_profile(&store, &station.key()).await?;
            print_json(&profile)
        }
        Commands::Routes => {
            let mut catalogue: BTreeMap<String, Vec<Stop>> = BTreeMap::new();
            for route in store.routes().await? {
                let stops = store.stops(&route).await?;
                info!(route = %route, stops = stops.len(), "Route");
                catalogue.insert(route, stops);
            }
            print_json(&catalogue)
        }
    };

    store.close().await;
    result
}

async fn open_store(path: &Path) -> Result<SqliteStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    SqliteStore::connect(path)
        .await
        .with_context(|| format!("opening database {}", path.display()))
}

/// Runs the poll loop until Ctrl+C, rebuilding travel-time CSVs in the
/// background.
#[tracing::instrument(skip(settings, store), fields(routes = ?settings.routes))]
async fn collect(settings: &Settings, store: SqliteStore, max_cycles: usize) -> Result<()> {
    let http = BasicClient::new(settings.fetch_timeout())?;
    let feed = DsatFeed::new(http, &settings.feed_url)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, finishing current cycle");
            let _ = ctrl_c_tx.send(true);
        }
    });

    let refresher = tokio::spawn(refresh_travel_times(
        store.clone(),
        settings.routes.clone(),
        settings.outlier_policy(),
        settings.travel_time_dir.clone(),
        settings.stats_refresh(),
        shutdown_rx.clone(),
    ));

    if max_cycles == 0 {
        info!(interval_secs = settings.poll_interval_secs, "Polling infinitely. Press Ctrl+C to stop.");
    }

    let mut collector = Collector::new(feed, store, settings.reaper(), settings.collector(max_cycles));
    collector.run(shutdown_rx).await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = refresher.await {
        error!(error = %e, "Travel-time refresher panicked");
    }
    Ok(())
}

/// Rewrites the travel-time CSVs every `every` until shutdown.
async fn refresh_travel_times(
    store: SqliteStore,
    routes: Vec<String>,
    policy: OutlierPolicy,
    dir: PathBuf,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match export_travel_times(&store, &routes, &policy, &dir).await {
                    Ok(written) => info!(written, "Travel-time artifacts refreshed"),
                    Err(e) => error!(error = %e, "Failed to refresh travel-time artifacts"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
