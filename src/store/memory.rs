//! In-process store for tests and dry runs.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{ArrivalStore, EventFilter, EventOrder, StoreError};
use crate::model::{ArrivalEvent, Stop};

/// [`ArrivalStore`] holding events in memory.
///
/// Appends can be made to fail on demand with [`MemoryStore::set_failing`],
/// which is how persistence failures are exercised.
#[derive(Clone, Default)]
pub struct MemoryStore {
    events: Arc<Mutex<Vec<ArrivalEvent>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Events in append order.
    pub fn events(&self) -> Vec<ArrivalEvent> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ArrivalEvent>> {
        // A poisoned lock still holds a consistent Vec.
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn matches(filter: &EventFilter, e: &ArrivalEvent) -> bool {
    filter.route.as_ref().is_none_or(|r| &e.route == r)
        && filter.station_code.as_ref().is_none_or(|c| &e.station_code == c)
        && filter.station_index.is_none_or(|i| e.station_index == i)
        && filter.since.is_none_or(|t| e.arrival_time >= t)
}

#[async_trait]
impl ArrivalStore for MemoryStore {
    async fn append(&self, event: &ArrivalEvent) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        self.lock().push(event.clone());
        Ok(())
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<ArrivalEvent>, StoreError> {
        let mut events: Vec<ArrivalEvent> = self
            .lock()
            .iter()
            .filter(|e| matches(filter, e))
            .cloned()
            .collect();

        match filter.order {
            EventOrder::ByBus => events.sort_by(|a, b| {
                (&a.bus_plate, a.arrival_time, a.station_index).cmp(&(
                    &b.bus_plate,
                    b.arrival_time,
                    b.station_index,
                ))
            }),
            EventOrder::Recent => events.sort_by(|a, b| {
                (b.arrival_time, b.station_index).cmp(&(a.arrival_time, a.station_index))
            }),
        }

        if let Some(limit) = filter.limit {
            events.truncate(limit as usize);
        }
        Ok(events)
    }

    async fn routes(&self) -> Result<Vec<String>, StoreError> {
        let routes: BTreeSet<String> = self.lock().iter().map(|e| e.route.clone()).collect();
        Ok(routes.into_iter().collect())
    }

    async fn stops(&self, route: &str) -> Result<Vec<Stop>, StoreError> {
        let stops: BTreeSet<(u32, String)> = self
            .lock()
            .iter()
            .filter(|e| e.route == route)
            .map(|e| (e.station_index, e.station_code.clone()))
            .collect();
        Ok(stops
            .into_iter()
            .map(|(index, code)| Stop::new(code, index))
            .collect())
    }
}
