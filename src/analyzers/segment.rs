//! Splits a bus's event history into trips.
//!
//! Events are walked in `(bus_plate, arrival_time, station_index)` order. A
//! trip ends whenever the plate (or route) changes or the station index
//! fails to increase, which is what happens when a bus starts its next run.

use crate::model::ArrivalEvent;

/// One traversal of a route by one bus. Station indices are strictly
/// increasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trip {
    pub trip_id: u64,
    pub bus_plate: String,
    pub events: Vec<ArrivalEvent>,
}

fn starts_new_trip(previous: &ArrivalEvent, current: &ArrivalEvent) -> bool {
    previous.bus_plate != current.bus_plate
        || previous.route != current.route
        || current.station_index <= previous.station_index
}

fn sort_by_bus(events: &mut [ArrivalEvent]) {
    events.sort_by(|a, b| {
        (&a.bus_plate, a.arrival_time, a.station_index).cmp(&(&b.bus_plate, b.arrival_time, b.station_index))
    });
}

/// Trip id for each event of an already ordered stream, starting at 0.
pub fn assign_trip_ids(events: &[ArrivalEvent]) -> Vec<u64> {
    let mut ids = Vec::with_capacity(events.len());
    let mut trip_id = 0u64;

    for (i, event) in events.iter().enumerate() {
        if i > 0 && starts_new_trip(&events[i - 1], event) {
            trip_id += 1;
        }
        ids.push(trip_id);
    }

    ids
}

/// Groups `events` into trips, in any input order.
///
/// Trips with a single event carry no travel time and are dropped, so the
/// returned ids may have gaps.
pub fn segment_trips(events: &[ArrivalEvent]) -> Vec<Trip> {
    let mut ordered = events.to_vec();
    sort_by_bus(&mut ordered);
    let ids = assign_trip_ids(&ordered);

    let mut trips: Vec<Trip> = Vec::new();
    for (event, trip_id) in ordered.into_iter().zip(ids) {
        match trips.last_mut() {
            Some(trip) if trip.trip_id == trip_id => trip.events.push(event),
            _ => trips.push(Trip {
                trip_id,
                bus_plate: event.bus_plate.clone(),
                events: vec![event],
            }),
        }
    }

    trips.retain(|trip| trip.events.len() >= 2);
    trips
}
