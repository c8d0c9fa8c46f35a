//! Ten-minute time buckets shared by resolution and storage
//!
//! GOES full-disk products are published on a ten-minute cadence. Both the
//! remote key resolver and the time-series store floor timestamps to the
//! containing ten-minute window, so a request and its stored artifact always
//! address the same scan.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};

/// Format of entries in per-product index files.
const INDEX_KEY_FORMAT: &str = "%Y-%m-%dT%H:%MZ";

/// A timestamp floored to a ten-minute boundary.
///
/// This is the unit of equality for both remote-key matching and storage
/// indexing: any two timestamps inside one ten-minute window produce the
/// same bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeBucket(DateTime<Utc>);

impl TimeBucket {
    /// Floors `at` to the containing ten-minute window, dropping seconds and
    /// sub-second precision.
    pub fn floor(at: DateTime<Utc>) -> Self {
        let minute = at.minute() - at.minute() % 10;
        let floored = at
            .with_minute(minute)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(at);
        Self(floored)
    }

    /// Start of the window.
    pub fn start(&self) -> DateTime<Utc> {
        self.0
    }

    /// The string recorded in index files, e.g. `2025-08-14T19:00Z`.
    pub fn index_key(&self) -> String {
        self.0.format(INDEX_KEY_FORMAT).to_string()
    }

    /// Parses an index-file entry back into its bucket.
    pub fn parse_index_key(s: &str) -> Result<Self> {
        let naive = NaiveDateTime::parse_from_str(s, INDEX_KEY_FORMAT)
            .map_err(|_| Error::InvalidBucket(s.to_string()))?;
        Ok(Self::floor(naive.and_utc()))
    }

    /// Listing scope under a product prefix: `YYYY/DDD/HH`.
    pub fn hour_prefix(&self) -> String {
        self.0.format("%Y/%j/%H").to_string()
    }

    /// Scan-start substring embedded in GOES object keys: `_sYYYYDDDHHMM`.
    pub fn scan_token(&self) -> String {
        format!("_s{}", self.0.format("%Y%j%H%M"))
    }
}
