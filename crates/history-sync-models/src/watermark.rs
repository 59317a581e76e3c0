use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Boundary of already-ingested remote history
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Watermark(pub DateTime<Utc>);

impl Watermark {
    pub fn parse(raw: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|dt| Watermark(dt.with_timezone(&Utc)))
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }

    /// Next watermark after observing `newest`.
    ///
    /// Backs off by `margin` so equal-timestamp events at the boundary are
    /// fetched again (and collapsed by dedup), and never moves backwards.
    pub fn advance(previous: Option<Watermark>, newest: Option<DateTime<Utc>>, margin: Duration) -> Option<Watermark> {
        let candidate = newest.map(|ts| Watermark(ts - margin));
        match (previous, candidate) {
            (Some(prev), Some(next)) => Some(prev.max(next)),
            (prev, None) => prev,
            (None, next) => next,
        }
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}
