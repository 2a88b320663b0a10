//! UTC hour-bucket mapping.
//!
//! One poller run owns exactly one hour bucket: the UTC-truncated top of
//! the hour. Bucket identity doubles as the run-lock key, so truncation
//! must be idempotent and every instant in `[H, H+1h)` must map to `H`.

use chrono::{DateTime, TimeZone, Utc};

/// Number of seconds in an hour bucket.
const SECS_PER_HOUR: i64 = 3600;

/// Truncates a UTC instant to the top of its hour.
#[must_use]
pub fn truncate_to_hour_utc(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp().div_euclid(SECS_PER_HOUR) * SECS_PER_HOUR;
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
