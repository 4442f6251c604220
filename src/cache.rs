//! Caching layer for per-route travel-time tables.
//!
//! A table is rebuilt from the whole event history, which only grows, so
//! reads are served from the cache and a route is rebuilt at most once per
//! TTL. Callers may see statistics up to one TTL old.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache as MokaCache;
use tracing::debug;

use crate::analyzers::analyzer::build_travel_times;
use crate::analyzers::travel_time::OutlierPolicy;
use crate::analyzers::types::TravelTimeTable;
use crate::store::ArrivalStore;

/// Configuration for the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a table is served before it is rebuilt.
    pub ttl: Duration,

    /// Maximum number of cached routes.
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            max_capacity: 64,
        }
    }
}

/// Travel-time tables keyed by route.
pub struct TravelTimeCache {
    tables: MokaCache<String, Arc<TravelTimeTable>>,
    policy: OutlierPolicy,
}

impl TravelTimeCache {
    pub fn new(config: &CacheConfig, policy: OutlierPolicy) -> Self {
        let tables = MokaCache::builder()
            .time_to_live(config.ttl)
            .max_capacity(config.max_capacity)
            .build();

        Self { tables, policy }
    }

    /// Returns the table for `route`, building it from `store` on a miss.
    /// Concurrent misses for the same route share one build.
    pub async fn get<S>(&self, store: &S, route: &str) -> anyhow::Result<Arc<TravelTimeTable>>
    where
        S: ArrivalStore + ?Sized,
    {
        self.tables
            .try_get_with(route.to_string(), async {
                debug!(route, "Travel-time cache miss, rebuilding");
                build_travel_times(store, route, &self.policy)
                    .await
                    .map(Arc::new)
            })
            .await
            .map_err(|e| anyhow::anyhow!("{e:#}"))
    }

    pub async fn invalidate(&self, route: &str) {
        self.tables.invalidate(route).await;
    }
}
