use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single reachability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "up",
            CheckStatus::Down => "down",
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, CheckStatus::Up)
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "up" => Ok(CheckStatus::Up),
            "down" => Ok(CheckStatus::Down),
            other => Err(format!("unknown check status `{other}`")),
        }
    }
}

/// One row of the `checks` collection.
///
/// Timestamps carry millisecond precision, the same as the stored column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub timestamp: DateTime<Utc>,
    pub target: String,
    pub status: CheckStatus,
    /// Time until the probe finished, successfully or not
    pub latency_ms: i64,
}

impl CheckRecord {
    pub fn new(target: impl Into<String>, status: CheckStatus, latency_ms: i64) -> Self {
        Self { timestamp: now_millis(), target: target.into(), status, latency_ms }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(3);
        self
    }
}

/// One row of the `speedtests` collection. Only complete measurements are ever built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedRecord {
    pub timestamp: DateTime<Utc>,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub latency_ms: i64,
}

impl SpeedRecord {
    pub fn new(download_mbps: f64, upload_mbps: f64, latency_ms: i64) -> Self {
        Self { timestamp: now_millis(), download_mbps, upload_mbps, latency_ms }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(3);
        self
    }
}

/// The two append-only collections held by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Checks,
    SpeedTests,
}

impl Collection {
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Checks => "checks",
            Collection::SpeedTests => "speedtests",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    Ascending,
    #[default]
    NewestFirst,
}

impl Order {
    fn sql(&self) -> &'static str {
        match self {
            Order::Ascending => "ASC",
            Order::NewestFirst => "DESC",
        }
    }
}

/// Time-range scan over one collection. `start` is inclusive, `end` exclusive.
#[derive(Debug, Clone)]
pub struct RangeQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub limit: Option<usize>,
    pub order: Order,
    /// Only meaningful for the checks collection
    pub target: Option<String>,
}

impl RangeQuery {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end, limit: None, order: Order::default(), target: None }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub(crate) fn order_sql(&self) -> &'static str {
        self.order.sql()
    }
}

/// Physical size of the database file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageFootprint {
    pub size_bytes: i64,
}

/// Current time at the precision records are stored with
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Convert a timestamp to the stored representation (Unix milliseconds)
pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Like [`to_millis`] but rounds a sub-millisecond remainder up.
///
/// Stored timestamps are whole milliseconds, so for any stored `t`,
/// `t < bound` holds exactly when `t < to_millis_ceil(bound)`.
pub fn to_millis_ceil(time: DateTime<Utc>) -> i64 {
    let millis = time.timestamp_millis();
    if time.timestamp_subsec_nanos() % 1_000_000 == 0 { millis } else { millis.saturating_add(1) }
}

/// Convert a stored timestamp back, `None` if out of range
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        assert_eq!("up".parse::<CheckStatus>(), Ok(CheckStatus::Up));
        assert_eq!("down".parse::<CheckStatus>(), Ok(CheckStatus::Down));
        assert!("degraded".parse::<CheckStatus>().is_err());
        assert_eq!(CheckStatus::Down.to_string(), "down");
    }

    #[test]
    fn check_record_serializes_to_query_surface_shape() {
        let timestamp = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z").unwrap().with_timezone(&Utc);
        let record = CheckRecord::new("https://example.com", CheckStatus::Up, 42).at(timestamp);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["target"], "https://example.com");
        assert_eq!(json["status"], "up");
        assert_eq!(json["latency_ms"], 42);
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn millis_conversion_keeps_precision() {
        let now = from_millis(1_714_564_800_123).unwrap();
        assert_eq!(to_millis(now), 1_714_564_800_123);
        assert_eq!(to_millis_ceil(now), 1_714_564_800_123);
    }

    #[test]
    fn sub_millisecond_bounds_round_up() {
        let base = from_millis(1_714_564_800_123).unwrap();
        let bound = base + chrono::Duration::microseconds(1);
        assert_eq!(to_millis(bound), 1_714_564_800_123);
        assert_eq!(to_millis_ceil(bound), 1_714_564_800_124);
    }

    #[test]
    fn records_are_built_at_storage_precision() {
        let base = from_millis(1_714_564_800_123).unwrap();
        let record = CheckRecord::new("t", CheckStatus::Up, 1).at(base + chrono::Duration::microseconds(999));
        assert_eq!(record.timestamp, base);

        let speed = SpeedRecord::new(1.0, 1.0, 1);
        assert_eq!(speed.timestamp.timestamp_subsec_nanos() % 1_000_000, 0);
        assert_eq!(now_millis().timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
