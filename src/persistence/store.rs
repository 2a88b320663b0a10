//! The [`PriceStore`] trait — the seam between the services and the
//! relational store.
//!
//! Every write the services perform is a single atomic statement
//! (upsert or conditional update), so the trait surface is deliberately
//! primitive: no transactions cross it. [`super::postgres::PgStore`] is
//! the production implementation; tests drive the services against an
//! in-memory double.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PricefeedError;
use crate::persistence::models::{
    EventRow, EventUpdate, HourlyPriceRow, PollerRunEventRow, PollerRunRow, RunStatus,
};

/// Final counters and diagnostics written when a run finishes.
#[derive(Debug, Clone)]
pub struct RunCompletion {
    pub status: RunStatus,
    pub events_total: i32,
    pub events_processed: i32,
    pub events_succeeded: i32,
    pub events_failed: i32,
    pub finished_at: DateTime<Utc>,
    pub error_sample: Option<String>,
    pub debug: serde_json::Value,
}

/// Relational-store operations used by the poller, refresher, and
/// retention services.
#[async_trait]
pub trait PriceStore: Send + Sync {
    // ── events ──────────────────────────────────────────────────────

    /// Events eligible for polling: enabled, not ended, and with an
    /// `ends_at` that is NULL or in the future.
    async fn active_events(&self, now: DateTime<Utc>) -> Result<Vec<EventRow>, PricefeedError>;

    /// One event by TE id.
    async fn event(&self, te_event_id: i64) -> Result<Option<EventRow>, PricefeedError>;

    /// Every tracked event id, for "refresh all".
    async fn all_event_ids(&self) -> Result<Vec<i64>, PricefeedError>;

    /// Applies the full proposed field set for one event.
    async fn apply_event_update(&self, update: &EventUpdate) -> Result<(), PricefeedError>;

    // ── poller runs (hour lock) ─────────────────────────────────────

    /// Inserts the run row for an hour bucket. Returns `false` when the
    /// bucket already has a row (lock contention).
    async fn insert_run(
        &self,
        hour_bucket: DateTime<Utc>,
        batch_size: i32,
        now: DateTime<Utc>,
    ) -> Result<bool, PricefeedError>;

    /// Reads the run row for an hour bucket.
    async fn run(&self, hour_bucket: DateTime<Utc>)
    -> Result<Option<PollerRunRow>, PricefeedError>;

    /// Reclaims a stale, unfinished run row: marks the previous attempt
    /// failed with `stale_lock_timeout`, resets counters, and restamps
    /// `started_at` — leaving `finished_at` NULL so a later crash can be
    /// reclaimed again. Conditional on `finished_at IS NULL AND
    /// started_at < stale_before`; returns `true` only when exactly one
    /// row was touched (this caller won the reclaim race).
    async fn reclaim_stale_run(
        &self,
        hour_bucket: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
        batch_size: i32,
    ) -> Result<bool, PricefeedError>;

    /// Records how many events this run will process.
    async fn set_run_total(
        &self,
        hour_bucket: DateTime<Utc>,
        events_total: i32,
    ) -> Result<(), PricefeedError>;

    /// Bumps the processed counter after each batch.
    async fn set_run_processed(
        &self,
        hour_bucket: DateTime<Utc>,
        events_processed: i32,
    ) -> Result<(), PricefeedError>;

    /// Finalizes the run row: status, counters, `finished_at`,
    /// `error_sample`, and the debug blob.
    async fn finalize_run(
        &self,
        hour_bucket: DateTime<Utc>,
        completion: &RunCompletion,
    ) -> Result<(), PricefeedError>;

    // ── hourly prices ───────────────────────────────────────────────

    /// Upserts one `(event, hour)` cell.
    async fn upsert_hourly(&self, row: &HourlyPriceRow) -> Result<(), PricefeedError>;

    /// Most recent hourly row strictly before the given bucket.
    async fn latest_hourly_before(
        &self,
        te_event_id: i64,
        before: DateTime<Utc>,
    ) -> Result<Option<HourlyPriceRow>, PricefeedError>;

    // ── per-event audit rows ────────────────────────────────────────

    /// Upserts the per-event outcome row for a run.
    async fn upsert_run_event(&self, row: &PollerRunEventRow) -> Result<(), PricefeedError>;

    // ── retention & rollup ──────────────────────────────────────────

    /// Ids of events that have ended: `ended_at` set, or `ends_at` in
    /// the past with `ended_at` still NULL.
    async fn ended_event_ids(&self, now: DateTime<Utc>) -> Result<Vec<i64>, PricefeedError>;

    /// Deletes hourly rows for the given events older than `cutoff`.
    /// Returns the number of rows removed.
    async fn delete_hourly_before(
        &self,
        event_ids: &[i64],
        cutoff: DateTime<Utc>,
    ) -> Result<u64, PricefeedError>;

    /// Invokes the storage-side `rollup_hourly_to_daily()` procedure and
    /// returns the affected-row count it reports.
    async fn rollup_hourly_to_daily(&self) -> Result<i64, PricefeedError>;
}
