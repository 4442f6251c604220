//! Durable, append-only log of arrival events.
//!
//! [`ArrivalStore`] is the seam between ingestion and analysis. The only
//! write path is [`ArrivalStore::append`]; nothing updates or deletes rows.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

use crate::model::{ArrivalEvent, Stop};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted row could not be turned back into an [`ArrivalEvent`].
    #[error("invalid stored row: {0}")]
    InvalidRow(String),
}

/// Result ordering for [`EventFilter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventOrder {
    /// `bus_plate, arrival_time, station_index`, the order trip
    /// segmentation expects.
    #[default]
    ByBus,
    /// Newest first.
    Recent,
}

/// Selection over the event log. Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub route: Option<String>,
    pub station_code: Option<String>,
    pub station_index: Option<u32>,
    /// Inclusive lower bound on arrival time.
    pub since: Option<NaiveDateTime>,
    pub order: EventOrder,
    pub limit: Option<u32>,
}

impl EventFilter {
    pub fn route(route: impl Into<String>) -> Self {
        Self {
            route: Some(route.into()),
            ..Default::default()
        }
    }

    pub fn at_stop(mut self, stop: &Stop) -> Self {
        self.station_code = Some(stop.station_code.clone());
        self.station_index = Some(stop.station_index);
        self
    }

    pub fn since(mut self, since: NaiveDateTime) -> Self {
        self.since = Some(since);
        self
    }

    pub fn recent(mut self, limit: u32) -> Self {
        self.order = EventOrder::Recent;
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
pub trait ArrivalStore: Send + Sync {
    /// Persists one event atomically.
    async fn append(&self, event: &ArrivalEvent) -> Result<(), StoreError>;

    /// Returns matching events in the filter's order.
    async fn query(&self, filter: &EventFilter) -> Result<Vec<ArrivalEvent>, StoreError>;

    /// Distinct routes with at least one event.
    async fn routes(&self) -> Result<Vec<String>, StoreError>;

    /// Distinct stops seen on `route`, ordered by station index.
    async fn stops(&self, route: &str) -> Result<Vec<Stop>, StoreError>;
}
