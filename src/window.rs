//! Time window generation for incremental crawls.
//!
//! A crawl does not scan a station's whole calendar. Instead it refreshes a
//! bounded window around "now", cut into fixed-size buckets. Each bucket start
//! is an *anchor instant* from which a station builds one range or day job.
//!
//! "now" is floored to an epoch-aligned bucket boundary first, so polling
//! twice within the same bucket produces identical anchors.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;

/// Bucket size and horizon of the crawl window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPolicy {
    pub bucket: Duration,
    /// Buckets before the current one.
    pub lookback: u32,
    /// Buckets after the current one.
    pub lookahead: u32,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            bucket: Duration::hours(1),
            lookback: 1,
            lookahead: 24,
        }
    }
}

/// YAML shape of a [`WindowPolicy`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub bucket_minutes: i64,
    pub lookback: u32,
    pub lookahead: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        let p = WindowPolicy::default();
        Self {
            bucket_minutes: p.bucket.num_minutes(),
            lookback: p.lookback,
            lookahead: p.lookahead,
        }
    }
}

impl From<&WindowConfig> for WindowPolicy {
    fn from(c: &WindowConfig) -> Self {
        Self {
            bucket: Duration::minutes(c.bucket_minutes.max(1)),
            lookback: c.lookback,
            lookahead: c.lookahead,
        }
    }
}

impl WindowPolicy {
    /// Start of the bucket containing `now`.
    pub fn floor<Z: TimeZone>(&self, now: &DateTime<Z>) -> DateTime<Utc> {
        let width = self.bucket.num_seconds().max(1);
        let ts = now.timestamp();
        let floored = ts - ts.rem_euclid(width);
        // floored is within a bucket of a valid timestamp, so it is valid too
        Utc.timestamp_opt(floored, 0)
            .single()
            .unwrap_or_else(|| now.with_timezone(&Utc))
    }

    /// Ordered anchor instants covering `[floor(now) - lookback, floor(now) + lookahead]`.
    pub fn anchors<Z: TimeZone>(&self, now: &DateTime<Z>) -> Vec<DateTime<Utc>> {
        let base = self.floor(now);
        let back = i64::from(self.lookback);
        let ahead = i64::from(self.lookahead);
        let width = self.bucket.num_seconds();
        (-back..=ahead)
            .map(|k| base + Duration::seconds(width * k))
            .collect()
    }
}
