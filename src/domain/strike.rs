// Lightning strike records as delivered by the feed
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One strike from a newline-delimited feed body.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct StrikeRecord {
    /// Nanoseconds since the Unix epoch.
    #[serde(rename = "time")]
    pub timestamp_ns: i64,
    pub lat: f64,
    pub lon: f64,
}

impl StrikeRecord {
    /// Age of the strike relative to `now`, in whole seconds.
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        let now_ns = now.timestamp_nanos_opt().unwrap_or(i64::MAX);
        now_ns.saturating_sub(self.timestamp_ns) / 1_000_000_000
    }
}

/// Parse a raw feed body, skipping blank and unparseable lines.
pub fn parse_strikes(raw: &str) -> Vec<StrikeRecord> {
    let mut skipped = 0usize;
    let strikes: Vec<StrikeRecord> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<StrikeRecord>(line) {
            Ok(strike) => Some(strike),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .collect();

    if skipped > 0 {
        tracing::debug!("Skipped {} unparseable strike lines", skipped);
    }
    strikes
}
