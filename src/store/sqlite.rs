use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use super::{ArrivalStore, EventFilter, EventOrder, StoreError};
use crate::model::{ArrivalEvent, Stop, TIME_FORMAT};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS bus_data \
    (route TEXT, bus_plate TEXT, station_code TEXT, arrival_time TEXT, station_index INT)";

const SELECT_EVENTS: &str =
    "SELECT route, bus_plate, station_code, arrival_time, station_index FROM bus_data WHERE 1 = 1";

type EventRow = (String, String, String, String, i64);

/// [`ArrivalStore`] backed by a SQLite `bus_data` table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        info!(path = %path.as_ref().display(), "Arrival store opened");
        Self::init(pool).await
    }

    /// A private database that lives as long as the store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection to :memory: is a separate database, so pin one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Closes the pool; later calls fail with a database error.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn event_from_row(row: EventRow) -> Result<ArrivalEvent, StoreError> {
    let (route, bus_plate, station_code, arrival_time, station_index) = row;

    let arrival_time = NaiveDateTime::parse_from_str(&arrival_time, TIME_FORMAT)
        .map_err(|e| StoreError::InvalidRow(format!("arrival_time '{arrival_time}': {e}")))?;
    let station_index = u32::try_from(station_index)
        .map_err(|_| StoreError::InvalidRow(format!("station_index {station_index}")))?;

    Ok(ArrivalEvent {
        route,
        bus_plate,
        station_code,
        station_index,
        arrival_time,
    })
}

#[async_trait]
impl ArrivalStore for SqliteStore {
    async fn append(&self, event: &ArrivalEvent) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO bus_data (route, bus_plate, station_code, arrival_time, station_index) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.route.as_str())
        .bind(event.bus_plate.as_str())
        .bind(event.station_code.as_str())
        .bind(event.formatted_time())
        .bind(i64::from(event.station_index))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(
            route = %event.route,
            bus_plate = %event.bus_plate,
            station = %event.stop(),
            "Arrival persisted"
        );
        Ok(())
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<ArrivalEvent>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_EVENTS);

        if let Some(route) = &filter.route {
            qb.push(" AND route = ").push_bind(route.clone());
        }
        if let Some(code) = &filter.station_code {
            qb.push(" AND station_code = ").push_bind(code.clone());
        }
        if let Some(index) = filter.station_index {
            qb.push(" AND station_index = ").push_bind(i64::from(index));
        }
        if let Some(since) = filter.since {
            // The text layout sorts chronologically.
            qb.push(" AND arrival_time >= ")
                .push_bind(since.format(TIME_FORMAT).to_string());
        }

        qb.push(match filter.order {
            EventOrder::ByBus => " ORDER BY bus_plate, arrival_time, station_index",
            EventOrder::Recent => " ORDER BY arrival_time DESC, station_index DESC",
        });

        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = qb.build_query_as::<EventRow>().fetch_all(&self.pool).await?;
        rows.into_iter().map(event_from_row).collect()
    }

    async fn routes(&self) -> Result<Vec<String>, StoreError> {
        let routes = sqlx::query_scalar::<_, String>("SELECT DISTINCT route FROM bus_data ORDER BY route")
            .fetch_all(&self.pool)
            .await?;
        Ok(routes)
    }

    async fn stops(&self, route: &str) -> Result<Vec<Stop>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT DISTINCT station_code, station_index FROM bus_data \
             WHERE route = ? ORDER BY station_index, station_code",
        )
        .bind(route)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(code, index)| {
                let index = u32::try_from(index)
                    .map_err(|_| StoreError::InvalidRow(format!("station_index {index}")))?;
                Ok(Stop::new(code, index))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 10, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn event(route: &str, plate: &str, code: &str, index: u32, time: NaiveDateTime) -> ArrivalEvent {
        ArrivalEvent {
            route: route.to_string(),
            bus_plate: plate.to_string(),
            station_code: code.to_string(),
            station_index: index,
            arrival_time: time,
        }
    }

    #[tokio::test]
    async fn test_append_and_query_by_bus_order() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.append(&event("73", "B", "T1", 0, at(8, 0, 0))).await.unwrap();
        store.append(&event("73", "A", "T2", 1, at(8, 5, 0))).await.unwrap();
        store.append(&event("73", "A", "T1", 0, at(8, 0, 0))).await.unwrap();
        store.append(&event("71", "A", "X1", 0, at(9, 0, 0))).await.unwrap();

        let events = store.query(&EventFilter::route("73")).await.unwrap();

        let order: Vec<_> = events
            .iter()
            .map(|e| (e.bus_plate.as_str(), e.station_index))
            .collect();
        assert_eq!(order, vec![("A", 0), ("A", 1), ("B", 0)]);
        assert_eq!(events[1].arrival_time, at(8, 5, 0));
    }

    #[tokio::test]
    async fn test_query_recent_with_limit() {
        let store = SqliteStore::in_memory().await.unwrap();
        for minute in 0..5 {
            store
                .append(&event("73", "A", "T1", 0, at(8, minute, 0)))
                .await
                .unwrap();
        }

        let filter = EventFilter::route("73").at_stop(&Stop::new("T1", 0)).recent(3);
        let events = store.query(&filter).await.unwrap();

        let minutes: Vec<_> = events.iter().map(|e| e.arrival_time).collect();
        assert_eq!(minutes, vec![at(8, 4, 0), at(8, 3, 0), at(8, 2, 0)]);
    }

    #[tokio::test]
    async fn test_query_since_is_inclusive() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.append(&event("73", "A", "T1", 0, at(7, 59, 59))).await.unwrap();
        store.append(&event("73", "A", "T2", 1, at(8, 0, 0))).await.unwrap();

        let events = store
            .query(&EventFilter::route("73").since(at(8, 0, 0)))
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].station_index, 1);
    }

    #[tokio::test]
    async fn test_routes_and_stops() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.append(&event("73", "A", "T2", 1, at(8, 5, 0))).await.unwrap();
        store.append(&event("73", "B", "T1", 0, at(8, 0, 0))).await.unwrap();
        store.append(&event("73", "A", "T1", 0, at(9, 0, 0))).await.unwrap();
        store.append(&event("701X", "C", "Z1", 0, at(9, 0, 0))).await.unwrap();

        assert_eq!(store.routes().await.unwrap(), vec!["701X", "73"]);
        assert_eq!(
            store.stops("73").await.unwrap(),
            vec![Stop::new("T1", 0), Stop::new("T2", 1)]
        );
    }

    #[tokio::test]
    async fn test_append_after_close_fails() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.close().await;

        let result = store.append(&event("73", "A", "T1", 0, at(8, 0, 0))).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }
}
