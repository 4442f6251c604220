//! JSON parser for DSAT route-station responses.

use serde::Deserialize;

use crate::fetch::FeedError;
use crate::snapshot::{BusReport, Snapshot, StationSnapshot};
use crate::status::BusStatus;

#[derive(Deserialize)]
struct Response {
    data: Option<Data>,
}

#[derive(Deserialize)]
struct Data {
    #[serde(rename = "routeInfo", default)]
    route_info: Vec<RawStation>,
}

#[derive(Deserialize)]
struct RawStation {
    #[serde(rename = "staCode")]
    sta_code: String,
    #[serde(rename = "busInfo", default)]
    bus_info: Option<Vec<RawBus>>,
}

#[derive(Deserialize)]
struct RawBus {
    #[serde(rename = "busPlate")]
    bus_plate: String,
    #[serde(default)]
    status: serde_json::Value,
}

/// Decodes a route-station response into a [`Snapshot`].
///
/// # Errors
///
/// Returns [`FeedError::Malformed`] if the body is not JSON, lacks
/// `data.routeInfo`, or carries an empty station list.
pub fn parse_snapshot(bytes: &[u8]) -> Result<Snapshot, FeedError> {
    let response: Response =
        serde_json::from_slice(bytes).map_err(|e| FeedError::Malformed(e.to_string()))?;

    let data = response
        .data
        .ok_or_else(|| FeedError::Malformed("missing data".to_string()))?;

    if data.route_info.is_empty() {
        return Err(FeedError::Malformed("routeInfo is empty".to_string()));
    }

    let stations = data
        .route_info
        .into_iter()
        .map(|station| StationSnapshot {
            station_code: station.sta_code,
            buses: station
                .bus_info
                .unwrap_or_default()
                .into_iter()
                .map(|bus| BusReport::new(bus.bus_plate, BusStatus::from_json(&bus.status)))
                .collect(),
        })
        .collect();

    Ok(Snapshot { stations })
}
