//! Output formatting and persistence for analysis results.
//!
//! Supports JSON logging of query results and the per-route travel-time
//! CSV artifact.

use anyhow::Result;
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

use crate::analyzers::types::TravelTimeTable;

/// Logs any result as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Writes the filtered samples of `table` to `path`, replacing any previous
/// artifact for the route.
pub fn write_travel_times(path: &Path, table: &TravelTimeTable) -> Result<()> {
    debug!(path = %path.display(), rows = table.rows.len(), "Writing travel-time CSV");

    // Write next to the target and rename, so readers never see a half file.
    let tmp = path.with_extension("csv.tmp");
    let file = File::create(&tmp)?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);

    for row in &table.rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    drop(writer);

    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::types::{Forecast, TravelTimeRow};
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    fn row(secs: i64) -> TravelTimeRow {
        TravelTimeRow {
            start_station: "T530".to_string(),
            start_station_index: 0,
            end_station: "M11/1".to_string(),
            end_station_index: 1,
            travel_time_seconds: secs,
        }
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&Forecast::NoData).unwrap();
    }

    #[test]
    fn test_write_travel_times_header_and_rows() {
        let path = temp_path("bus_tracker_test_rows.csv");
        let _ = fs::remove_file(&path);

        let table = TravelTimeTable {
            route: "73".to_string(),
            rows: vec![row(100), row(140)],
            ..Default::default()
        };
        write_travel_times(&path, &table).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "start_station,start_station_index,end_station,end_station_index,travel_time_seconds"
        );
        assert_eq!(lines[1], "T530,0,M11/1,1,100");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_travel_times_replaces_previous() {
        let path = temp_path("bus_tracker_test_replace.csv");
        let _ = fs::remove_file(&path);

        let mut table = TravelTimeTable {
            rows: vec![row(100), row(140), row(120)],
            ..Default::default()
        };
        write_travel_times(&path, &table).unwrap();
        table.rows.truncate(1);
        write_travel_times(&path, &table).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        fs::remove_file(&path).unwrap();
    }
}
