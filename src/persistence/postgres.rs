//! PostgreSQL implementation of the price store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::PricefeedError;
use crate::persistence::models::{
    EventRow, EventUpdate, HourlyPriceRow, PollerRunEventRow, PollerRunRow, RunStatus,
};
use crate::persistence::store::{PriceStore, RunCompletion};

/// PostgreSQL-backed price store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new store with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err(e: sqlx::Error) -> PricefeedError {
    PricefeedError::Store(e.to_string())
}

type EventTuple = (
    i64,
    String,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    bool,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn event_from_tuple(t: EventTuple) -> EventRow {
    let (te_event_id, title, starts_at, ends_at, ended_at, polling_enabled, olt_url, created_at, updated_at) =
        t;
    EventRow {
        te_event_id,
        title,
        starts_at,
        ends_at,
        ended_at,
        polling_enabled,
        olt_url,
        created_at,
        updated_at,
    }
}

const EVENT_COLUMNS: &str = "te_event_id, title, starts_at, ends_at, ended_at, polling_enabled, \
                             olt_url, created_at, updated_at";

type HourlyTuple = (
    i64,
    DateTime<Utc>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<i32>,
    DateTime<Utc>,
);

fn hourly_from_tuple(t: HourlyTuple) -> HourlyPriceRow {
    let (te_event_id, captured_at_hour, min_price, avg_price, max_price, listing_count, created_at) =
        t;
    HourlyPriceRow {
        te_event_id,
        captured_at_hour,
        min_price,
        avg_price,
        max_price,
        listing_count,
        created_at,
    }
}

#[async_trait]
impl PriceStore for PgStore {
    async fn active_events(&self, now: DateTime<Utc>) -> Result<Vec<EventRow>, PricefeedError> {
        let rows = sqlx::query_as::<_, EventTuple>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE polling_enabled = TRUE AND ended_at IS NULL \
               AND (ends_at IS NULL OR ends_at > $1) \
             ORDER BY te_event_id"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows.into_iter().map(event_from_tuple).collect())
    }

    async fn event(&self, te_event_id: i64) -> Result<Option<EventRow>, PricefeedError> {
        let row = sqlx::query_as::<_, EventTuple>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE te_event_id = $1"
        ))
        .bind(te_event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.map(event_from_tuple))
    }

    async fn all_event_ids(&self) -> Result<Vec<i64>, PricefeedError> {
        sqlx::query_scalar::<_, i64>("SELECT te_event_id FROM events ORDER BY te_event_id")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)
    }

    async fn apply_event_update(&self, update: &EventUpdate) -> Result<(), PricefeedError> {
        sqlx::query(
            "UPDATE events SET title = $2, starts_at = $3, ends_at = $4, ended_at = $5, \
             polling_enabled = $6, olt_url = $7, updated_at = $8 \
             WHERE te_event_id = $1",
        )
        .bind(update.te_event_id)
        .bind(&update.title)
        .bind(update.starts_at)
        .bind(update.ends_at)
        .bind(update.ended_at)
        .bind(update.polling_enabled)
        .bind(&update.olt_url)
        .bind(update.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn insert_run(
        &self,
        hour_bucket: DateTime<Utc>,
        batch_size: i32,
        now: DateTime<Utc>,
    ) -> Result<bool, PricefeedError> {
        let result = sqlx::query(
            "INSERT INTO poller_runs \
             (hour_bucket, status, batch_size, events_total, events_processed, \
              events_succeeded, events_failed, started_at, debug) \
             VALUES ($1, $2, $3, 0, 0, 0, 0, $4, '{}'::jsonb) \
             ON CONFLICT (hour_bucket) DO NOTHING",
        )
        .bind(hour_bucket)
        .bind(RunStatus::Started.as_str())
        .bind(batch_size)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn run(
        &self,
        hour_bucket: DateTime<Utc>,
    ) -> Result<Option<PollerRunRow>, PricefeedError> {
        type RunTuple = (
            DateTime<Utc>,
            String,
            i32,
            i32,
            i32,
            i32,
            i32,
            DateTime<Utc>,
            Option<DateTime<Utc>>,
            Option<String>,
            serde_json::Value,
        );

        let row = sqlx::query_as::<_, RunTuple>(
            "SELECT hour_bucket, status, batch_size, events_total, events_processed, \
             events_succeeded, events_failed, started_at, finished_at, error_sample, debug \
             FROM poller_runs WHERE hour_bucket = $1",
        )
        .bind(hour_bucket)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.map(
            |(
                hour_bucket,
                status,
                batch_size,
                events_total,
                events_processed,
                events_succeeded,
                events_failed,
                started_at,
                finished_at,
                error_sample,
                debug,
            )| {
                Ok(PollerRunRow {
                    hour_bucket,
                    status: RunStatus::parse(&status)?,
                    batch_size,
                    events_total,
                    events_processed,
                    events_succeeded,
                    events_failed,
                    started_at,
                    finished_at,
                    error_sample,
                    debug,
                })
            },
        )
        .transpose()
    }

    async fn reclaim_stale_run(
        &self,
        hour_bucket: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
        batch_size: i32,
    ) -> Result<bool, PricefeedError> {
        // finished_at stays NULL so a crash of *this* attempt is itself
        // reclaimable later.
        let result = sqlx::query(
            "UPDATE poller_runs SET status = $2, error_sample = $3, started_at = $4, \
             batch_size = $5, events_total = 0, events_processed = 0, \
             events_succeeded = 0, events_failed = 0 \
             WHERE hour_bucket = $1 AND finished_at IS NULL AND started_at < $6",
        )
        .bind(hour_bucket)
        .bind(RunStatus::Failed.as_str())
        .bind("stale_lock_timeout")
        .bind(now)
        .bind(batch_size)
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_run_total(
        &self,
        hour_bucket: DateTime<Utc>,
        events_total: i32,
    ) -> Result<(), PricefeedError> {
        sqlx::query("UPDATE poller_runs SET events_total = $2 WHERE hour_bucket = $1")
            .bind(hour_bucket)
            .bind(events_total)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn set_run_processed(
        &self,
        hour_bucket: DateTime<Utc>,
        events_processed: i32,
    ) -> Result<(), PricefeedError> {
        sqlx::query("UPDATE poller_runs SET events_processed = $2 WHERE hour_bucket = $1")
            .bind(hour_bucket)
            .bind(events_processed)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn finalize_run(
        &self,
        hour_bucket: DateTime<Utc>,
        completion: &RunCompletion,
    ) -> Result<(), PricefeedError> {
        sqlx::query(
            "UPDATE poller_runs SET status = $2, events_total = $3, events_processed = $4, \
             events_succeeded = $5, events_failed = $6, finished_at = $7, \
             error_sample = $8, debug = $9 \
             WHERE hour_bucket = $1",
        )
        .bind(hour_bucket)
        .bind(completion.status.as_str())
        .bind(completion.events_total)
        .bind(completion.events_processed)
        .bind(completion.events_succeeded)
        .bind(completion.events_failed)
        .bind(completion.finished_at)
        .bind(&completion.error_sample)
        .bind(&completion.debug)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn upsert_hourly(&self, row: &HourlyPriceRow) -> Result<(), PricefeedError> {
        sqlx::query(
            "INSERT INTO event_price_hourly \
             (te_event_id, captured_at_hour, min_price, avg_price, max_price, \
              listing_count, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (te_event_id, captured_at_hour) DO UPDATE SET \
               min_price = excluded.min_price, avg_price = excluded.avg_price, \
               max_price = excluded.max_price, listing_count = excluded.listing_count",
        )
        .bind(row.te_event_id)
        .bind(row.captured_at_hour)
        .bind(row.min_price)
        .bind(row.avg_price)
        .bind(row.max_price)
        .bind(row.listing_count)
        .bind(row.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn latest_hourly_before(
        &self,
        te_event_id: i64,
        before: DateTime<Utc>,
    ) -> Result<Option<HourlyPriceRow>, PricefeedError> {
        let row = sqlx::query_as::<_, HourlyTuple>(
            "SELECT te_event_id, captured_at_hour, min_price, avg_price, max_price, \
             listing_count, created_at \
             FROM event_price_hourly \
             WHERE te_event_id = $1 AND captured_at_hour < $2 \
             ORDER BY captured_at_hour DESC LIMIT 1",
        )
        .bind(te_event_id)
        .bind(before)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(row.map(hourly_from_tuple))
    }

    async fn upsert_run_event(&self, row: &PollerRunEventRow) -> Result<(), PricefeedError> {
        sqlx::query(
            "INSERT INTO poller_run_events \
             (hour_bucket, te_event_id, status, listing_count, min_price, avg_price, \
              max_price, error) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (hour_bucket, te_event_id) DO UPDATE SET \
               status = excluded.status, listing_count = excluded.listing_count, \
               min_price = excluded.min_price, avg_price = excluded.avg_price, \
               max_price = excluded.max_price, error = excluded.error",
        )
        .bind(row.hour_bucket)
        .bind(row.te_event_id)
        .bind(row.status.as_str())
        .bind(row.listing_count)
        .bind(row.min_price)
        .bind(row.avg_price)
        .bind(row.max_price)
        .bind(&row.error)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn ended_event_ids(&self, now: DateTime<Utc>) -> Result<Vec<i64>, PricefeedError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT te_event_id FROM events \
             WHERE ended_at IS NOT NULL OR (ended_at IS NULL AND ends_at < $1)",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)
    }

    async fn delete_hourly_before(
        &self,
        event_ids: &[i64],
        cutoff: DateTime<Utc>,
    ) -> Result<u64, PricefeedError> {
        if event_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "DELETE FROM event_price_hourly \
             WHERE te_event_id = ANY($1) AND captured_at_hour < $2",
        )
        .bind(event_ids.to_vec())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected())
    }

    async fn rollup_hourly_to_daily(&self) -> Result<i64, PricefeedError> {
        sqlx::query_scalar::<_, i64>("SELECT rollup_hourly_to_daily()")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)
    }
}
