//! Service layer: the run coordinator, poller engine, metadata
//! refresher, and retention enforcer.
//!
//! Services own no state beyond handles to the store and the TE API;
//! every invocation receives its clock from the caller so behaviour is
//! reproducible under test.

pub mod poller;
pub mod refresher;
pub mod retention;
pub mod run_coordinator;

pub use poller::PollerEngine;
pub use refresher::MetadataRefresher;
pub use retention::RetentionEnforcer;
pub use run_coordinator::{AcquireOutcome, RunCoordinator};

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory doubles for the store and the TE API, shared by the
    //! service tests.

    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};

    use crate::domain::hour::truncate_to_hour_utc;
    use crate::error::PricefeedError;
    use crate::persistence::models::{
        EventRow, EventUpdate, HourlyPriceRow, PollerRunEventRow, PollerRunRow, RunStatus,
    };
    use crate::persistence::store::{PriceStore, RunCompletion};
    use crate::te::types::{PriceValue, TeEvent, TeEventsPage, TeListing};
    use crate::te::{TeApi, TeError};

    /// Seeds a minimal event row.
    pub fn seed_event(id: i64, polling_enabled: bool, ends_at: Option<DateTime<Utc>>) -> EventRow {
        let now = Utc::now();
        EventRow {
            te_event_id: id,
            title: format!("Event {id}"),
            starts_at: ends_at.map(|e| e - Duration::hours(4)),
            ends_at,
            ended_at: None,
            polling_enabled,
            olt_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seeds an hourly row with fixed prices at the hour containing `ts`.
    pub fn seed_hourly(id: i64, ts: DateTime<Utc>) -> HourlyPriceRow {
        HourlyPriceRow {
            te_event_id: id,
            captured_at_hour: truncate_to_hour_utc(ts),
            min_price: Some(100.0),
            avg_price: Some(120.0),
            max_price: Some(150.0),
            listing_count: Some(5),
            created_at: ts,
        }
    }

    /// A buyable listing that passes every eligibility rule.
    pub fn buyable_listing(price: f64) -> TeListing {
        TeListing {
            id: Some(1),
            listing_type: Some("event".to_string()),
            retail_price: Some(PriceValue::Number(price)),
            available_quantity: Some(4),
            splits: vec![2, 4],
            public_notes: None,
            notes: None,
        }
    }

    #[derive(Default)]
    struct MemState {
        events: BTreeMap<i64, EventRow>,
        hourly: BTreeMap<(i64, DateTime<Utc>), HourlyPriceRow>,
        runs: BTreeMap<DateTime<Utc>, PollerRunRow>,
        run_events: BTreeMap<(DateTime<Utc>, i64), PollerRunEventRow>,
        rollup_result: i64,
        rollup_calls: u32,
    }

    /// In-memory [`PriceStore`] mirroring the Postgres semantics.
    #[derive(Default)]
    pub struct MemStore {
        state: Mutex<MemState>,
    }

    impl MemStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn put_event(&self, event: EventRow) {
            let mut state = self.state.lock().expect("mem store poisoned");
            state.events.insert(event.te_event_id, event);
        }

        pub fn put_hourly(&self, row: HourlyPriceRow) {
            let mut state = self.state.lock().expect("mem store poisoned");
            state
                .hourly
                .insert((row.te_event_id, row.captured_at_hour), row);
        }

        pub fn set_rollup_result(&self, rows: i64) {
            self.state.lock().expect("mem store poisoned").rollup_result = rows;
        }

        pub fn rollup_calls(&self) -> u32 {
            self.state.lock().expect("mem store poisoned").rollup_calls
        }

        pub fn event_row(&self, id: i64) -> Option<EventRow> {
            self.state
                .lock()
                .expect("mem store poisoned")
                .events
                .get(&id)
                .cloned()
        }

        pub fn run_row(&self, hour: DateTime<Utc>) -> Option<PollerRunRow> {
            self.state
                .lock()
                .expect("mem store poisoned")
                .runs
                .get(&hour)
                .cloned()
        }

        pub fn run_event_rows(&self, hour: DateTime<Utc>) -> Vec<PollerRunEventRow> {
            self.state
                .lock()
                .expect("mem store poisoned")
                .run_events
                .iter()
                .filter(|((h, _), _)| *h == hour)
                .map(|(_, row)| row.clone())
                .collect()
        }

        pub fn hourly_row(&self, id: i64, hour: DateTime<Utc>) -> Option<HourlyPriceRow> {
            self.state
                .lock()
                .expect("mem store poisoned")
                .hourly
                .get(&(id, hour))
                .cloned()
        }

        pub fn hourly_count(&self, id: i64) -> usize {
            self.state
                .lock()
                .expect("mem store poisoned")
                .hourly
                .keys()
                .filter(|(event_id, _)| *event_id == id)
                .count()
        }
    }

    #[async_trait]
    impl PriceStore for MemStore {
        async fn active_events(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<EventRow>, PricefeedError> {
            let state = self.state.lock().expect("mem store poisoned");
            Ok(state
                .events
                .values()
                .filter(|e| {
                    e.polling_enabled
                        && e.ended_at.is_none()
                        && e.ends_at.is_none_or(|ends| ends > now)
                })
                .cloned()
                .collect())
        }

        async fn event(&self, te_event_id: i64) -> Result<Option<EventRow>, PricefeedError> {
            Ok(self.event_row(te_event_id))
        }

        async fn all_event_ids(&self) -> Result<Vec<i64>, PricefeedError> {
            let state = self.state.lock().expect("mem store poisoned");
            Ok(state.events.keys().copied().collect())
        }

        async fn apply_event_update(&self, update: &EventUpdate) -> Result<(), PricefeedError> {
            let mut state = self.state.lock().expect("mem store poisoned");
            if let Some(event) = state.events.get_mut(&update.te_event_id) {
                event.title = update.title.clone();
                event.starts_at = update.starts_at;
                event.ends_at = update.ends_at;
                event.ended_at = update.ended_at;
                event.polling_enabled = update.polling_enabled;
                event.olt_url = update.olt_url.clone();
                event.updated_at = update.updated_at;
            }
            Ok(())
        }

        async fn insert_run(
            &self,
            hour_bucket: DateTime<Utc>,
            batch_size: i32,
            now: DateTime<Utc>,
        ) -> Result<bool, PricefeedError> {
            let mut state = self.state.lock().expect("mem store poisoned");
            if state.runs.contains_key(&hour_bucket) {
                return Ok(false);
            }
            state.runs.insert(
                hour_bucket,
                PollerRunRow {
                    hour_bucket,
                    status: RunStatus::Started,
                    batch_size,
                    events_total: 0,
                    events_processed: 0,
                    events_succeeded: 0,
                    events_failed: 0,
                    started_at: now,
                    finished_at: None,
                    error_sample: None,
                    debug: serde_json::json!({}),
                },
            );
            Ok(true)
        }

        async fn run(
            &self,
            hour_bucket: DateTime<Utc>,
        ) -> Result<Option<PollerRunRow>, PricefeedError> {
            Ok(self.run_row(hour_bucket))
        }

        async fn reclaim_stale_run(
            &self,
            hour_bucket: DateTime<Utc>,
            stale_before: DateTime<Utc>,
            now: DateTime<Utc>,
            batch_size: i32,
        ) -> Result<bool, PricefeedError> {
            let mut state = self.state.lock().expect("mem store poisoned");
            let Some(run) = state.runs.get_mut(&hour_bucket) else {
                return Ok(false);
            };
            if run.finished_at.is_some() || run.started_at >= stale_before {
                return Ok(false);
            }
            run.status = RunStatus::Failed;
            run.error_sample = Some("stale_lock_timeout".to_string());
            run.started_at = now;
            run.batch_size = batch_size;
            run.events_total = 0;
            run.events_processed = 0;
            run.events_succeeded = 0;
            run.events_failed = 0;
            Ok(true)
        }

        async fn set_run_total(
            &self,
            hour_bucket: DateTime<Utc>,
            events_total: i32,
        ) -> Result<(), PricefeedError> {
            let mut state = self.state.lock().expect("mem store poisoned");
            if let Some(run) = state.runs.get_mut(&hour_bucket) {
                run.events_total = events_total;
            }
            Ok(())
        }

        async fn set_run_processed(
            &self,
            hour_bucket: DateTime<Utc>,
            events_processed: i32,
        ) -> Result<(), PricefeedError> {
            let mut state = self.state.lock().expect("mem store poisoned");
            if let Some(run) = state.runs.get_mut(&hour_bucket) {
                run.events_processed = events_processed;
            }
            Ok(())
        }

        async fn finalize_run(
            &self,
            hour_bucket: DateTime<Utc>,
            completion: &RunCompletion,
        ) -> Result<(), PricefeedError> {
            let mut state = self.state.lock().expect("mem store poisoned");
            if let Some(run) = state.runs.get_mut(&hour_bucket) {
                run.status = completion.status;
                run.events_total = completion.events_total;
                run.events_processed = completion.events_processed;
                run.events_succeeded = completion.events_succeeded;
                run.events_failed = completion.events_failed;
                run.finished_at = Some(completion.finished_at);
                run.error_sample = completion.error_sample.clone();
                run.debug = completion.debug.clone();
            }
            Ok(())
        }

        async fn upsert_hourly(&self, row: &HourlyPriceRow) -> Result<(), PricefeedError> {
            let mut state = self.state.lock().expect("mem store poisoned");
            let key = (row.te_event_id, row.captured_at_hour);
            match state.hourly.get_mut(&key) {
                Some(existing) => {
                    existing.min_price = row.min_price;
                    existing.avg_price = row.avg_price;
                    existing.max_price = row.max_price;
                    existing.listing_count = row.listing_count;
                }
                None => {
                    state.hourly.insert(key, row.clone());
                }
            }
            Ok(())
        }

        async fn latest_hourly_before(
            &self,
            te_event_id: i64,
            before: DateTime<Utc>,
        ) -> Result<Option<HourlyPriceRow>, PricefeedError> {
            let state = self.state.lock().expect("mem store poisoned");
            Ok(state
                .hourly
                .iter()
                .filter(|((id, hour), _)| *id == te_event_id && *hour < before)
                .max_by_key(|((_, hour), _)| *hour)
                .map(|(_, row)| row.clone()))
        }

        async fn upsert_run_event(&self, row: &PollerRunEventRow) -> Result<(), PricefeedError> {
            let mut state = self.state.lock().expect("mem store poisoned");
            state
                .run_events
                .insert((row.hour_bucket, row.te_event_id), row.clone());
            Ok(())
        }

        async fn ended_event_ids(&self, now: DateTime<Utc>) -> Result<Vec<i64>, PricefeedError> {
            let state = self.state.lock().expect("mem store poisoned");
            Ok(state
                .events
                .values()
                .filter(|e| {
                    e.ended_at.is_some()
                        || (e.ended_at.is_none() && e.ends_at.is_some_and(|ends| ends < now))
                })
                .map(|e| e.te_event_id)
                .collect())
        }

        async fn delete_hourly_before(
            &self,
            event_ids: &[i64],
            cutoff: DateTime<Utc>,
        ) -> Result<u64, PricefeedError> {
            let mut state = self.state.lock().expect("mem store poisoned");
            let before = state.hourly.len();
            state
                .hourly
                .retain(|(id, hour), _| !(event_ids.contains(id) && *hour < cutoff));
            Ok((before - state.hourly.len()) as u64)
        }

        async fn rollup_hourly_to_daily(&self) -> Result<i64, PricefeedError> {
            let mut state = self.state.lock().expect("mem store poisoned");
            state.rollup_calls += 1;
            Ok(state.rollup_result)
        }
    }

    /// Scripted [`TeApi`] double that records every call.
    #[derive(Default)]
    pub struct StubTe {
        listings: Mutex<HashMap<i64, Result<Vec<TeListing>, String>>>,
        events: Mutex<HashMap<i64, TeEvent>>,
        listing_calls: Mutex<Vec<i64>>,
    }

    impl StubTe {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_listings(self, event_id: i64, listings: Vec<TeListing>) -> Self {
            self.listings
                .lock()
                .expect("stub poisoned")
                .insert(event_id, Ok(listings));
            self
        }

        pub fn with_listing_error(self, event_id: i64, message: &str) -> Self {
            self.listings
                .lock()
                .expect("stub poisoned")
                .insert(event_id, Err(message.to_string()));
            self
        }

        pub fn with_event(self, event_id: i64, event: TeEvent) -> Self {
            self.events
                .lock()
                .expect("stub poisoned")
                .insert(event_id, event);
            self
        }

        pub fn listing_calls(&self) -> Vec<i64> {
            self.listing_calls.lock().expect("stub poisoned").clone()
        }
    }

    #[async_trait]
    impl TeApi for StubTe {
        async fn listings(&self, event_id: i64) -> Result<Vec<TeListing>, TeError> {
            self.listing_calls
                .lock()
                .expect("stub poisoned")
                .push(event_id);
            match self.listings.lock().expect("stub poisoned").get(&event_id) {
                Some(Ok(listings)) => Ok(listings.clone()),
                Some(Err(message)) => Err(TeError::RetryExhausted {
                    attempts: 4,
                    last: message.clone(),
                }),
                None => Ok(Vec::new()),
            }
        }

        async fn event(&self, event_id: i64) -> Result<TeEvent, TeError> {
            self.events
                .lock()
                .expect("stub poisoned")
                .get(&event_id)
                .cloned()
                .ok_or(TeError::PermanentHttp {
                    status: 404,
                    body: format!("event {event_id} not found"),
                })
        }

        async fn events_by_performer(
            &self,
            _performer_id: i64,
            _page: u32,
            _per_page: u32,
            _primary: Option<bool>,
        ) -> Result<TeEventsPage, TeError> {
            Ok(TeEventsPage::default())
        }
    }
}
