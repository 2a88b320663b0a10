//! Hourly poller engine.
//!
//! One invocation owns one hour bucket (via [`RunCoordinator`]) and
//! fans out over every active event in bounded-concurrency batches:
//! events inside a batch are polled in parallel, batches run strictly
//! one after another, and `events_processed` is bumped only at batch
//! boundaries. Per-event failures never abort the run; they are
//! tallied and the run classifies itself at the end.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::domain::aggregate::{PriceAggregate, aggregate_listings};
use crate::domain::hour::truncate_to_hour_utc;
use crate::error::PricefeedError;
use crate::persistence::models::{
    EventPollStatus, EventRow, HourlyPriceRow, PollerRunEventRow, RunStatus,
};
use crate::persistence::store::{PriceStore, RunCompletion};
use crate::service::retention::RetentionEnforcer;
use crate::service::run_coordinator::{AcquireOutcome, RunCoordinator};
use crate::te::TeApi;

/// Marker recorded for hours where an event had no eligible listings.
pub const NO_ELIGIBLE_LISTINGS: &str = "no_eligible_listings";

/// Counter set reported for a completed run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PollCounters {
    pub events_total: i32,
    pub events_processed: i32,
    pub events_succeeded: i32,
    pub events_failed: i32,
    pub events_skipped: i32,
}

/// Why an invocation did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyRan,
    AlreadyRunning,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyRan => "already_ran",
            Self::AlreadyRunning => "already_running",
        }
    }
}

/// Result of one hourly invocation.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// The hour lock was not acquired; nothing was polled.
    Skipped {
        hour_bucket: DateTime<Utc>,
        reason: SkipReason,
    },
    /// The run executed and finalized its run row.
    Completed {
        hour_bucket: DateTime<Utc>,
        status: RunStatus,
        counters: PollCounters,
        total_duration_ms: u64,
    },
}

/// Outcome of polling a single event.
struct EventOutcome {
    status: EventPollStatus,
    error: Option<String>,
}

/// Fans TE listings fetches out over the active events of one hour.
pub struct PollerEngine {
    store: Arc<dyn PriceStore>,
    te: Arc<dyn TeApi>,
    coordinator: RunCoordinator,
    retention: RetentionEnforcer,
    batch_size: usize,
}

impl PollerEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn PriceStore>,
        te: Arc<dyn TeApi>,
        coordinator: RunCoordinator,
        retention: RetentionEnforcer,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            te,
            coordinator,
            retention,
            batch_size: batch_size.max(1),
        }
    }

    /// Runs the poll for the hour bucket containing `now`.
    ///
    /// # Errors
    ///
    /// Returns an error only for coordinator-level failures (lock
    /// errors, failure to read the event set); per-event failures are
    /// absorbed into the run classification.
    pub async fn run_hour(&self, now: DateTime<Utc>) -> Result<PollOutcome, PricefeedError> {
        let hour_bucket = truncate_to_hour_utc(now);
        let batch_size = i32::try_from(self.batch_size).unwrap_or(i32::MAX);

        match self.coordinator.acquire(hour_bucket, batch_size, now).await? {
            AcquireOutcome::Acquired => {}
            AcquireOutcome::AlreadyRan => {
                tracing::info!(%hour_bucket, "hour already captured, skipping");
                return Ok(PollOutcome::Skipped {
                    hour_bucket,
                    reason: SkipReason::AlreadyRan,
                });
            }
            AcquireOutcome::AlreadyRunning => {
                tracing::info!(%hour_bucket, "another run holds the hour lock, skipping");
                return Ok(PollOutcome::Skipped {
                    hour_bucket,
                    reason: SkipReason::AlreadyRunning,
                });
            }
        }

        let started = Instant::now();

        let events = match self.store.active_events(now).await {
            Ok(events) => events,
            Err(err) => return self.abort_run(hour_bucket, err).await,
        };
        if let Err(err) = self
            .store
            .set_run_total(hour_bucket, events.len() as i32)
            .await
        {
            return self.abort_run(hour_bucket, err).await;
        }

        // Retention is opportunistic here; failures only show up in the
        // debug blob.
        let retention_debug = match self.retention.enforce(now).await {
            Ok(summary) => serde_json::json!(summary),
            Err(err) => {
                tracing::warn!(error = %err, "retention pass failed during poll");
                serde_json::json!({ "error": err.to_string() })
            }
        };

        tracing::info!(
            %hour_bucket,
            events_total = events.len(),
            batch_size = self.batch_size,
            "starting hourly poll"
        );

        let mut outcomes: Vec<EventOutcome> = Vec::with_capacity(events.len());
        let mut processed: i32 = 0;
        let mut batch_count: u32 = 0;

        for batch in events.chunks(self.batch_size) {
            batch_count += 1;
            let results = join_all(
                batch
                    .iter()
                    .map(|event| self.poll_event(event, hour_bucket, now)),
            )
            .await;
            outcomes.extend(results);

            processed += batch.len() as i32;
            if let Err(err) = self.store.set_run_processed(hour_bucket, processed).await {
                tracing::warn!(error = %err, "failed to update processed counter");
            }
        }

        let counters = PollCounters {
            events_total: events.len() as i32,
            events_processed: processed,
            events_succeeded: outcomes
                .iter()
                .filter(|o| o.status == EventPollStatus::Succeeded)
                .count() as i32,
            events_failed: outcomes
                .iter()
                .filter(|o| o.status == EventPollStatus::Failed)
                .count() as i32,
            events_skipped: outcomes
                .iter()
                .filter(|o| o.status == EventPollStatus::Skipped)
                .count() as i32,
        };

        let status = classify_run(counters.events_succeeded, counters.events_failed);
        let error_sample = outcomes.iter().find_map(|o| {
            (o.status == EventPollStatus::Failed)
                .then(|| o.error.clone())
                .flatten()
        });

        let completion = RunCompletion {
            status,
            events_total: counters.events_total,
            events_processed: counters.events_processed,
            events_succeeded: counters.events_succeeded,
            events_failed: counters.events_failed,
            finished_at: Utc::now(),
            error_sample,
            debug: serde_json::json!({
                "duration_ms": started.elapsed().as_millis() as u64,
                "batch_count": batch_count,
                "skipped_count": counters.events_skipped,
                "retention": retention_debug,
            }),
        };
        self.coordinator.finalize(hour_bucket, &completion).await?;

        tracing::info!(
            %hour_bucket,
            status = status.as_str(),
            succeeded = counters.events_succeeded,
            failed = counters.events_failed,
            skipped = counters.events_skipped,
            "hourly poll finished"
        );

        Ok(PollOutcome::Completed {
            hour_bucket,
            status,
            counters,
            total_duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Best-effort failure finalization for coordinator-level errors.
    async fn abort_run(
        &self,
        hour_bucket: DateTime<Utc>,
        err: PricefeedError,
    ) -> Result<PollOutcome, PricefeedError> {
        tracing::error!(%hour_bucket, error = %err, "aborting run");
        let completion = RunCompletion {
            status: RunStatus::Failed,
            events_total: 0,
            events_processed: 0,
            events_succeeded: 0,
            events_failed: 0,
            finished_at: Utc::now(),
            error_sample: Some(err.to_string()),
            debug: serde_json::json!({ "aborted": true }),
        };
        if let Err(finalize_err) = self.coordinator.finalize(hour_bucket, &completion).await {
            tracing::error!(error = %finalize_err, "failed to mark aborted run");
        }
        Err(err)
    }

    /// Polls one event and records its hourly row plus audit row.
    /// Never propagates errors; everything folds into the outcome.
    async fn poll_event(
        &self,
        event: &EventRow,
        hour_bucket: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> EventOutcome {
        let te_event_id = event.te_event_id;
        let (outcome, aggregate) = match self.capture_event(te_event_id, hour_bucket, now).await {
            Ok(Some(agg)) => (
                EventOutcome {
                    status: EventPollStatus::Succeeded,
                    error: None,
                },
                Some(agg),
            ),
            Ok(None) => (
                EventOutcome {
                    status: EventPollStatus::Skipped,
                    error: Some(NO_ELIGIBLE_LISTINGS.to_string()),
                },
                None,
            ),
            Err(message) => {
                tracing::warn!(te_event_id, error = %message, "event poll failed");
                (
                    EventOutcome {
                        status: EventPollStatus::Failed,
                        error: Some(message),
                    },
                    None,
                )
            }
        };

        let audit = PollerRunEventRow {
            hour_bucket,
            te_event_id,
            status: outcome.status,
            listing_count: match outcome.status {
                EventPollStatus::Succeeded => aggregate.map(|a| a.listing_count),
                EventPollStatus::Skipped => Some(0),
                EventPollStatus::Failed => None,
            },
            min_price: aggregate.map(|a| a.min_price),
            avg_price: aggregate.map(|a| a.avg_price),
            max_price: aggregate.map(|a| a.max_price),
            error: outcome.error.clone(),
        };
        if let Err(err) = self.store.upsert_run_event(&audit).await {
            tracing::warn!(te_event_id, error = %err, "failed to write run event row");
        }

        outcome
    }

    /// Fetches listings, aggregates, and upserts the hourly row.
    /// `Ok(None)` means the hour was captured with no eligible listings.
    async fn capture_event(
        &self,
        te_event_id: i64,
        hour_bucket: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<PriceAggregate>, String> {
        let listings = self
            .te
            .listings(te_event_id)
            .await
            .map_err(|e| e.to_string())?;

        let aggregate = aggregate_listings(&listings);

        if let Some(agg) = &aggregate {
            self.warn_if_price_static(te_event_id, hour_bucket, agg).await;
        }

        let row = match &aggregate {
            Some(agg) => HourlyPriceRow::captured(te_event_id, hour_bucket, agg, now),
            None => HourlyPriceRow::empty(te_event_id, hour_bucket, now),
        };
        self.store
            .upsert_hourly(&row)
            .await
            .map_err(|e| e.to_string())?;

        Ok(aggregate)
    }

    /// Diagnostic only: a min price identical to the previous capture
    /// often means the feed is serving stale inventory.
    async fn warn_if_price_static(
        &self,
        te_event_id: i64,
        hour_bucket: DateTime<Utc>,
        agg: &PriceAggregate,
    ) {
        match self.store.latest_hourly_before(te_event_id, hour_bucket).await {
            Ok(Some(prior)) if prior.min_price == Some(agg.min_price) => {
                tracing::warn!(
                    te_event_id,
                    prior_bucket = %prior.captured_at_hour,
                    current_bucket = %hour_bucket,
                    min_price = agg.min_price,
                    "min price unchanged since previous capture"
                );
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(te_event_id, error = %err, "prior-hour lookup failed");
            }
        }
    }
}

/// Run classification from the per-event tallies.
fn classify_run(succeeded: i32, failed: i32) -> RunStatus {
    if failed == 0 {
        RunStatus::Succeeded
    } else if succeeded > 0 {
        RunStatus::Partial
    } else {
        RunStatus::Failed
    }
}
