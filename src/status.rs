//! Normalised bus status at a station.

/// Status reported by the feed for one bus at one station.
///
/// | Feed value | Variant     |
/// |------------|-------------|
/// | `"0"`      | `Absent`    |
/// | `"1"`      | `Present`   |
/// | other      | `Unknown`   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BusStatus {
    #[default]
    Unknown,
    Absent,
    Present,
}

impl BusStatus {
    pub fn from_feed(raw: &str) -> Self {
        match raw.trim() {
            "0" => BusStatus::Absent,
            "1" => BusStatus::Present,
            _ => BusStatus::Unknown,
        }
    }

    /// Accepts the status as either a JSON string or a bare number.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::from_feed(s),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(0) => BusStatus::Absent,
                Some(1) => BusStatus::Present,
                _ => BusStatus::Unknown,
            },
            _ => BusStatus::Unknown,
        }
    }
}
