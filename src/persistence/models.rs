//! Row types and status enums for the relational store.
//!
//! Statuses are stored as text; the enums here own the canonical
//! spellings and refuse unknown values at decode time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::aggregate::PriceAggregate;
use crate::error::PricefeedError;

/// Terminal and in-flight states of one hourly poller run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Started,
    Succeeded,
    Partial,
    Failed,
}

impl RunStatus {
    /// Canonical text spelling stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Succeeded => "succeeded",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    /// Parses a stored status string.
    ///
    /// # Errors
    ///
    /// Returns [`PricefeedError::Store`] for unknown spellings.
    pub fn parse(raw: &str) -> Result<Self, PricefeedError> {
        match raw {
            "started" => Ok(Self::Started),
            "succeeded" => Ok(Self::Succeeded),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            other => Err(PricefeedError::Store(format!("unknown run status: {other}"))),
        }
    }
}

/// Outcome of polling a single event within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPollStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl EventPollStatus {
    /// Canonical text spelling stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// One tracked event from the `events` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    /// Upstream TE event identifier; the primary key.
    pub te_event_id: i64,
    /// Event name, mirroring TE `name`.
    pub title: String,
    /// Scheduled start.
    pub starts_at: Option<DateTime<Utc>>,
    /// Scheduled end (`starts_at` + the configured event duration).
    pub ends_at: Option<DateTime<Utc>>,
    /// Set once when the event first transitions past `ends_at`; never
    /// cleared afterwards.
    pub ended_at: Option<DateTime<Utc>>,
    /// Operator flag; auto-cleared when the event ends.
    pub polling_enabled: bool,
    /// Derived SEO URL.
    pub olt_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One `(event, hour)` cell from `event_price_hourly`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyPriceRow {
    pub te_event_id: i64,
    /// UTC-truncated top of the hour; with `te_event_id` the unique key.
    pub captured_at_hour: DateTime<Utc>,
    pub min_price: Option<f64>,
    pub avg_price: Option<f64>,
    pub max_price: Option<f64>,
    pub listing_count: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl HourlyPriceRow {
    /// Builds the row for an hour with data.
    #[must_use]
    pub fn captured(
        te_event_id: i64,
        hour: DateTime<Utc>,
        agg: &PriceAggregate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            te_event_id,
            captured_at_hour: hour,
            min_price: Some(agg.min_price),
            avg_price: Some(agg.avg_price),
            max_price: Some(agg.max_price),
            listing_count: Some(agg.listing_count),
            created_at: now,
        }
    }

    /// Builds the row for an hour with no eligible listings: zero count,
    /// NULL prices.
    #[must_use]
    pub fn empty(te_event_id: i64, hour: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            te_event_id,
            captured_at_hour: hour,
            min_price: None,
            avg_price: None,
            max_price: None,
            listing_count: Some(0),
            created_at: now,
        }
    }
}

/// One run-lock row from `poller_runs`. `hour_bucket` is unique and
/// provides mutual exclusion across concurrent invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerRunRow {
    pub hour_bucket: DateTime<Utc>,
    pub status: RunStatus,
    pub batch_size: i32,
    pub events_total: i32,
    pub events_processed: i32,
    pub events_succeeded: i32,
    pub events_failed: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// First error string observed during the run.
    pub error_sample: Option<String>,
    /// Free-form diagnostics (duration, batch count, retention summary).
    pub debug: serde_json::Value,
}

/// One per-event audit row from `poller_run_events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerRunEventRow {
    pub hour_bucket: DateTime<Utc>,
    pub te_event_id: i64,
    pub status: EventPollStatus,
    pub listing_count: Option<i32>,
    pub min_price: Option<f64>,
    pub avg_price: Option<f64>,
    pub max_price: Option<f64>,
    pub error: Option<String>,
}

/// Full proposed update for one event, applied atomically by the
/// metadata refresher.
#[derive(Debug, Clone)]
pub struct EventUpdate {
    pub te_event_id: i64,
    pub title: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub polling_enabled: bool,
    pub olt_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_round_trips_through_text() {
        for status in [
            RunStatus::Started,
            RunStatus::Succeeded,
            RunStatus::Partial,
            RunStatus::Failed,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()).ok(), Some(status));
        }
        assert!(RunStatus::parse("running").is_err());
    }

    #[test]
    fn empty_hourly_row_has_zero_count_and_null_prices() {
        let now = Utc::now();
        let row = HourlyPriceRow::empty(7, now, now);
        assert_eq!(row.listing_count, Some(0));
        assert!(row.min_price.is_none() && row.avg_price.is_none() && row.max_price.is_none());
    }
}
