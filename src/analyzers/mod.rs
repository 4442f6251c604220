//! Travel-time and wait-time analysis over the arrival log.
//!
//! Events are segmented into trips, every ordered pair of stops within a
//! trip yields a travel-time sample, and each (start, end) group is
//! outlier-filtered before its mean and spread are used for forecasts.

pub mod aggregate;
pub mod analyzer;
pub mod predict;
pub mod profile;
pub mod segment;
pub mod travel_time;
pub mod types;
pub mod utility;
