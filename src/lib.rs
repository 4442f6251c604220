//! Bus arrival tracking over a polled real-time feed.
//!
//! The collector polls every configured route, the detector turns station
//! status transitions into persisted arrival events, and the analyzers derive
//! travel-time statistics and wait-time forecasts from the stored history.

pub mod analyzers;
pub mod cache;
pub mod collector;
pub mod config;
pub mod detector;
pub mod fetch;
pub mod model;
pub mod output;
pub mod parser;
pub mod reaper;
pub mod snapshot;
pub mod status;
pub mod store;
