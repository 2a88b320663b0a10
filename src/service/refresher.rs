//! Metadata reconciliation against TE.
//!
//! For each requested event the refresher fetches the TE payload,
//! derives the full proposed field set, diffs it against the stored
//! row, and (outside dry-run) applies the whole set in one update.
//! URL regeneration is fail-closed: when it is required and the
//! builder rejects the payload, nothing at all is written for that
//! event. Lifecycle fields are one-way — `ended_at` is never cleared
//! and `polling_enabled` is never turned back on here.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::domain::olt_url::build_olt_url;
use crate::error::PricefeedError;
use crate::persistence::models::{EventRow, EventUpdate};
use crate::persistence::store::PriceStore;
use crate::te::TeApi;

/// Per-event refresh result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    Updated,
    Unchanged,
    Error,
}

/// One entry of the refresh report.
#[derive(Debug, Clone, Serialize)]
pub struct EventRefreshOutcome {
    pub te_event_id: i64,
    pub status: RefreshStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full refresh report.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub dry_run: bool,
    pub updated: u32,
    pub unchanged: u32,
    pub errors: u32,
    pub events: Vec<EventRefreshOutcome>,
}

/// Reconciles stored event metadata with TE.
pub struct MetadataRefresher {
    store: Arc<dyn PriceStore>,
    te: Arc<dyn TeApi>,
    olt_base_url: String,
    event_duration: Duration,
}

impl MetadataRefresher {
    #[must_use]
    pub fn new(
        store: Arc<dyn PriceStore>,
        te: Arc<dyn TeApi>,
        olt_base_url: String,
        event_duration_hours: i64,
    ) -> Self {
        Self {
            store,
            te,
            olt_base_url,
            event_duration: Duration::hours(event_duration_hours),
        }
    }

    /// Refreshes the given events, or every tracked event when `ids` is
    /// `None`. With `dry_run` the report is produced but nothing is
    /// written.
    ///
    /// # Errors
    ///
    /// Propagates a store failure while resolving the id list;
    /// per-event failures are reported in the summary instead.
    pub async fn refresh(
        &self,
        ids: Option<Vec<i64>>,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<RefreshSummary, PricefeedError> {
        let ids = match ids {
            Some(ids) => ids,
            None => self.store.all_event_ids().await?,
        };

        let mut summary = RefreshSummary {
            dry_run,
            updated: 0,
            unchanged: 0,
            errors: 0,
            events: Vec::with_capacity(ids.len()),
        };

        for te_event_id in ids {
            let outcome = self.refresh_event(te_event_id, dry_run, now).await;
            match outcome.status {
                RefreshStatus::Updated => summary.updated += 1,
                RefreshStatus::Unchanged => summary.unchanged += 1,
                RefreshStatus::Error => summary.errors += 1,
            }
            summary.events.push(outcome);
        }

        tracing::info!(
            dry_run,
            updated = summary.updated,
            unchanged = summary.unchanged,
            errors = summary.errors,
            "metadata refresh finished"
        );
        Ok(summary)
    }

    async fn refresh_event(
        &self,
        te_event_id: i64,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> EventRefreshOutcome {
        let current = match self.store.event(te_event_id).await {
            Ok(Some(event)) => event,
            Ok(None) => return error_outcome(te_event_id, "event is not tracked".to_string()),
            Err(err) => return error_outcome(te_event_id, err.to_string()),
        };

        let te_event = match self.te.event(te_event_id).await {
            Ok(event) => event,
            Err(err) => return error_outcome(te_event_id, err.to_string()),
        };

        // Proposed field set.
        let title = te_event
            .name
            .clone()
            .unwrap_or_else(|| current.title.clone());
        let starts_at = te_event.occurs_at_utc().or(current.starts_at);
        let ends_at = starts_at.map(|s| s + self.event_duration);
        let has_ended = ends_at.is_some_and(|e| now > e);
        let ended_at = current.ended_at.or(if has_ended { Some(now) } else { None });
        // An ended event never polls, no matter what the stored flag says.
        let polling_enabled = if ended_at.is_some() {
            false
        } else {
            current.polling_enabled
        };

        let url_inputs_changed = title != current.title
            || starts_at != current.starts_at
            || ends_at != current.ends_at;
        let olt_url = if current.olt_url.is_none() || url_inputs_changed {
            match build_olt_url(&self.olt_base_url, &te_event) {
                Ok(url) => Some(url),
                Err(err) => {
                    tracing::warn!(te_event_id, error = %err, "url regeneration failed, skipping event");
                    return error_outcome(te_event_id, err.to_string());
                }
            }
        } else {
            current.olt_url.clone()
        };

        let changes = diff_changes(&current, &title, starts_at, ends_at, ended_at, polling_enabled, &olt_url);
        if changes.is_empty() {
            return EventRefreshOutcome {
                te_event_id,
                status: RefreshStatus::Unchanged,
                changes,
                error: None,
            };
        }

        if !dry_run {
            let update = EventUpdate {
                te_event_id,
                title,
                starts_at,
                ends_at,
                ended_at,
                polling_enabled,
                olt_url,
                updated_at: now,
            };
            if let Err(err) = self.store.apply_event_update(&update).await {
                return error_outcome(te_event_id, err.to_string());
            }
        }

        EventRefreshOutcome {
            te_event_id,
            status: RefreshStatus::Updated,
            changes,
            error: None,
        }
    }
}

fn error_outcome(te_event_id: i64, message: String) -> EventRefreshOutcome {
    EventRefreshOutcome {
        te_event_id,
        status: RefreshStatus::Error,
        changes: Vec::new(),
        error: Some(message),
    }
}

/// Names of the fields whose proposed value differs from the stored
/// one. `updated_at` is appended whenever anything changes.
fn diff_changes(
    current: &EventRow,
    title: &str,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    polling_enabled: bool,
    olt_url: &Option<String>,
) -> Vec<String> {
    let mut changes = Vec::new();
    if title != current.title {
        changes.push("title".to_string());
    }
    if starts_at != current.starts_at {
        changes.push("starts_at".to_string());
    }
    if ends_at != current.ends_at {
        changes.push("ends_at".to_string());
    }
    if ended_at != current.ended_at {
        changes.push("ended_at".to_string());
    }
    if polling_enabled != current.polling_enabled {
        changes.push("polling_enabled".to_string());
    }
    if *olt_url != current.olt_url {
        changes.push("olt_url".to_string());
    }
    if !changes.is_empty() {
        changes.push("updated_at".to_string());
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{MemStore, StubTe, seed_event};
    use crate::te::types::{TeCategory, TeEvent, TeVenue};

    fn te_event(id: i64, name: &str, occurs_at: &str) -> TeEvent {
        TeEvent {
            id: Some(id),
            name: Some(name.to_string()),
            occurs_at: Some(occurs_at.to_string()),
            venue: Some(TeVenue {
                name: Some("United Center".to_string()),
                city: Some("Chicago".to_string()),
                state_code: Some("IL".to_string()),
                state: Some("Illinois".to_string()),
            }),
            category: Some(TeCategory {
                short_name: Some("NBA".to_string()),
                slug: None,
                name: None,
            }),
            timezone: Some("America/Chicago".to_string()),
        }
    }

    fn occurs_at_string(ts: DateTime<Utc>) -> String {
        ts.format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    fn refresher(store: Arc<MemStore>, te: Arc<StubTe>) -> MetadataRefresher {
        MetadataRefresher::new(store, te, "https://base".to_string(), 4)
    }

    #[tokio::test]
    async fn dry_run_reports_changes_without_writing() {
        let now = Utc::now();
        let future = now + Duration::days(10);
        let store = Arc::new(MemStore::new());
        let mut stored = seed_event(1, true, Some(future + Duration::hours(4)));
        stored.title = "Old".to_string();
        stored.olt_url = Some("https://base/events/old/1".to_string());
        store.put_event(stored.clone());

        let te = Arc::new(StubTe::new().with_event(1, te_event(1, "New", &occurs_at_string(future))));
        let summary = refresher(store.clone(), te)
            .refresh(Some(vec![1]), true, now)
            .await
            .expect("refresh");

        assert_eq!(summary.updated, 1);
        let outcome = &summary.events[0];
        assert_eq!(outcome.status, RefreshStatus::Updated);
        assert!(outcome.changes.iter().any(|c| c == "title"));
        assert!(outcome.changes.iter().any(|c| c == "updated_at"));

        // Store is untouched.
        let after = store.event_row(1).expect("event");
        assert_eq!(after.title, "Old");
        assert_eq!(after.updated_at, stored.updated_at);
    }

    #[tokio::test]
    async fn wet_run_applies_the_full_proposed_set() {
        let now = Utc::now();
        let future = now + Duration::days(10);
        let store = Arc::new(MemStore::new());
        let mut stored = seed_event(1, true, Some(future + Duration::hours(4)));
        stored.title = "Old".to_string();
        store.put_event(stored);

        let te = Arc::new(StubTe::new().with_event(1, te_event(1, "New", &occurs_at_string(future))));
        let summary = refresher(store.clone(), te)
            .refresh(Some(vec![1]), false, now)
            .await
            .expect("refresh");
        assert_eq!(summary.updated, 1);

        let after = store.event_row(1).expect("event");
        assert_eq!(after.title, "New");
        assert_eq!(after.updated_at, now);
        assert_eq!(after.ends_at, after.starts_at.map(|s| s + Duration::hours(4)));
        assert!(after.olt_url.is_some(), "missing url must be generated");
    }

    #[tokio::test]
    async fn url_regeneration_failure_fails_closed() {
        let now = Utc::now();
        let future = now + Duration::days(10);
        let store = Arc::new(MemStore::new());
        let mut stored = seed_event(1, true, Some(future + Duration::hours(4)));
        stored.title = "Old".to_string();
        stored.olt_url = Some("https://base/events/old/1".to_string());
        store.put_event(stored.clone());

        // Title changes, so the URL must be regenerated — but the TE
        // payload has no occurs_at, so the builder refuses.
        let mut broken = te_event(1, "New", "ignored");
        broken.occurs_at = None;
        let te = Arc::new(StubTe::new().with_event(1, broken));

        let summary = refresher(store.clone(), te)
            .refresh(Some(vec![1]), false, now)
            .await
            .expect("refresh");
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.events[0].status, RefreshStatus::Error);

        // Not a single field was written.
        let after = store.event_row(1).expect("event");
        assert_eq!(after.title, "Old");
        assert_eq!(after.updated_at, stored.updated_at);
    }

    #[tokio::test]
    async fn ended_event_gets_ended_at_and_polling_disabled() {
        let now = Utc::now();
        let past = now - Duration::days(2);
        let store = Arc::new(MemStore::new());
        store.put_event(seed_event(1, true, Some(past + Duration::hours(4))));

        let te = Arc::new(StubTe::new().with_event(1, te_event(1, "Event 1", &occurs_at_string(past))));
        let summary = refresher(store.clone(), te)
            .refresh(Some(vec![1]), false, now)
            .await
            .expect("refresh");
        assert_eq!(summary.updated, 1);

        let after = store.event_row(1).expect("event");
        assert_eq!(after.ended_at, Some(now));
        assert!(!after.polling_enabled);
    }

    #[tokio::test]
    async fn ended_at_is_monotonic_and_polling_never_reenabled() {
        let now = Utc::now();
        let past = now - Duration::days(2);
        let earlier_end = now - Duration::days(1);
        let store = Arc::new(MemStore::new());
        let mut stored = seed_event(1, false, Some(past + Duration::hours(4)));
        stored.ended_at = Some(earlier_end);
        store.put_event(stored);

        let te = Arc::new(StubTe::new().with_event(1, te_event(1, "Event 1", &occurs_at_string(past))));
        let _ = refresher(store.clone(), te)
            .refresh(Some(vec![1]), false, now)
            .await
            .expect("refresh");

        let after = store.event_row(1).expect("event");
        // The original ended_at survives and the flag stays off.
        assert_eq!(after.ended_at, Some(earlier_end));
        assert!(!after.polling_enabled);
    }

    #[tokio::test]
    async fn identical_metadata_reports_unchanged() {
        let now = Utc::now();
        let future = now + Duration::days(10);
        let store = Arc::new(MemStore::new());

        let payload = te_event(1, "Stable", &occurs_at_string(future));
        let mut stored = seed_event(1, true, None);
        stored.title = "Stable".to_string();
        stored.starts_at = payload.occurs_at_utc();
        stored.ends_at = stored.starts_at.map(|s| s + Duration::hours(4));
        stored.olt_url =
            Some(build_olt_url("https://base", &payload).expect("url builds"));
        store.put_event(stored.clone());

        let te = Arc::new(StubTe::new().with_event(1, payload));
        let summary = refresher(store.clone(), te)
            .refresh(Some(vec![1]), false, now)
            .await
            .expect("refresh");
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.events[0].status, RefreshStatus::Unchanged);
        assert!(summary.events[0].changes.is_empty());

        let after = store.event_row(1).expect("event");
        assert_eq!(after.updated_at, stored.updated_at);
    }

    #[tokio::test]
    async fn upstream_miss_is_reported_per_event() {
        let now = Utc::now();
        let store = Arc::new(MemStore::new());
        store.put_event(seed_event(1, true, None));
        store.put_event(seed_event(2, true, Some(now + Duration::days(5))));

        // Only event 2 exists upstream.
        let te = Arc::new(StubTe::new().with_event(
            2,
            te_event(2, "Event 2", &occurs_at_string(now + Duration::days(5))),
        ));
        let summary = refresher(store, te)
            .refresh(None, true, now)
            .await
            .expect("refresh");
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.events.len(), 2);
        assert_eq!(summary.events[0].te_event_id, 1);
        assert_eq!(summary.events[0].status, RefreshStatus::Error);
        assert_eq!(summary.events[1].status, RefreshStatus::Updated);
    }
}
