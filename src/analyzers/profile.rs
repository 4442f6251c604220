use chrono::Timelike;

use crate::analyzers::types::MinuteCount;
use crate::model::ArrivalEvent;

const MINUTES_PER_DAY: usize = 24 * 60;

/// Counts arrivals per minute of the day, zero-filled from `00:00` to
/// `23:59`, regardless of date.
pub fn arrival_profile(events: &[ArrivalEvent]) -> Vec<MinuteCount> {
    let mut counts = vec![0usize; MINUTES_PER_DAY];
    for event in events {
        let t = event.arrival_time;
        counts[(t.hour() * 60 + t.minute()) as usize] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(m, count)| MinuteCount {
            minute: format!("{:02}:{:02}", m / 60, m % 60),
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(day: u32, h: u32, m: u32, s: u32) -> ArrivalEvent {
        ArrivalEvent {
            route: "73".to_string(),
            bus_plate: "X1".to_string(),
            station_code: "T530".to_string(),
            station_index: 0,
            arrival_time: NaiveDate::from_ymd_opt(2023, 10, day)
                .unwrap()
                .and_hms_opt(h, m, s)
                .unwrap(),
        }
    }

    #[test]
    fn test_profile_covers_every_minute() {
        let profile = arrival_profile(&[]);
        assert_eq!(profile.len(), 1440);
        assert_eq!(profile[0].minute, "00:00");
        assert_eq!(profile[1439].minute, "23:59");
        assert!(profile.iter().all(|m| m.count == 0));
    }

    #[test]
    fn test_profile_merges_days() {
        let events = vec![event(5, 8, 15, 2), event(6, 8, 15, 59), event(6, 23, 59, 0)];

        let profile = arrival_profile(&events);

        assert_eq!(profile[8 * 60 + 15].count, 2);
        assert_eq!(profile[1439].count, 1);
        assert_eq!(profile.iter().map(|m| m.count).sum::<usize>(), 3);
    }
}
