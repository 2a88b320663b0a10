//! Request/response DTOs for the scheduler-facing endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::service::poller::{PollCounters, PollOutcome};
use crate::service::refresher::RefreshSummary;
use crate::service::retention::RetentionSummary;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
}

/// Run counters echoed back to the scheduler.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct RunCountersDto {
    pub events_total: i32,
    pub events_processed: i32,
    pub events_succeeded: i32,
    pub events_failed: i32,
    pub events_skipped: i32,
}

impl From<PollCounters> for RunCountersDto {
    fn from(c: PollCounters) -> Self {
        Self {
            events_total: c.events_total,
            events_processed: c.events_processed,
            events_succeeded: c.events_succeeded,
            events_failed: c.events_failed,
            events_skipped: c.events_skipped,
        }
    }
}

/// Response of the hourly poll endpoint: either a completed run with
/// counters, or `status = "skipped"` with a reason.
#[derive(Debug, Serialize, ToSchema)]
pub struct HourlyPollResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hour_bucket: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counters: Option<RunCountersDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<u64>,
}

impl From<PollOutcome> for HourlyPollResponse {
    fn from(outcome: PollOutcome) -> Self {
        match outcome {
            PollOutcome::Skipped { reason, .. } => Self {
                status: "skipped".to_string(),
                reason: Some(reason.as_str().to_string()),
                hour_bucket: None,
                counters: None,
                total_duration_ms: None,
            },
            PollOutcome::Completed {
                hour_bucket,
                status,
                counters,
                total_duration_ms,
            } => Self {
                status: status.as_str().to_string(),
                reason: None,
                hour_bucket: Some(hour_bucket),
                counters: Some(counters.into()),
                total_duration_ms: Some(total_duration_ms),
            },
        }
    }
}

/// Retention pass report.
#[derive(Debug, Serialize, ToSchema)]
pub struct RetentionSummaryDto {
    pub retention_days: u32,
    pub cutoff: DateTime<Utc>,
    pub ended_event_count: u64,
    pub deleted_hourly_rows: u64,
}

impl From<RetentionSummary> for RetentionSummaryDto {
    fn from(s: RetentionSummary) -> Self {
        Self {
            retention_days: s.retention_days,
            cutoff: s.cutoff,
            ended_event_count: s.ended_event_count as u64,
            deleted_hourly_rows: s.deleted_hourly_rows,
        }
    }
}

/// Response of the daily endpoint: rollup result plus retention report.
#[derive(Debug, Serialize, ToSchema)]
pub struct DailyRollupResponse {
    pub rolled_up_rows: i64,
    pub retention: RetentionSummaryDto,
}

/// Body of the metadata refresh endpoint. All fields optional; the id
/// precedence is query `event_id` > body `event_id` > `te_event_ids` >
/// all tracked events.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub event_id: Option<i64>,
    pub te_event_ids: Option<Vec<i64>>,
    /// Defaults to `true`: report what would change without writing.
    pub dry_run: Option<bool>,
}

/// Query parameters of the metadata refresh endpoint.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RefreshQuery {
    pub event_id: Option<i64>,
}

/// Per-event entry of the refresh report.
#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshEventDto {
    pub te_event_id: i64,
    pub status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response of the metadata refresh endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub dry_run: bool,
    pub updated: u32,
    pub unchanged: u32,
    pub errors: u32,
    pub events: Vec<RefreshEventDto>,
}

impl From<RefreshSummary> for RefreshResponse {
    fn from(summary: RefreshSummary) -> Self {
        Self {
            dry_run: summary.dry_run,
            updated: summary.updated,
            unchanged: summary.unchanged,
            errors: summary.errors,
            events: summary
                .events
                .into_iter()
                .map(|e| RefreshEventDto {
                    te_event_id: e.te_event_id,
                    status: match e.status {
                        crate::service::refresher::RefreshStatus::Updated => "updated",
                        crate::service::refresher::RefreshStatus::Unchanged => "unchanged",
                        crate::service::refresher::RefreshStatus::Error => "error",
                    }
                    .to_string(),
                    changes: e.changes,
                    error: e.error,
                })
                .collect(),
        }
    }
}
