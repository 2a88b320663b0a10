//! Hourly-row retention for ended events.
//!
//! Daily rows carry the long-term history; hourly rows only need to
//! survive long enough for the widget's short-range views. Once an
//! event has ended, its hourly rows older than the retention horizon
//! are pruned. The delete is keyed on an absolute cutoff, so repeating
//! it with the same clock removes nothing further.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::PricefeedError;
use crate::persistence::store::PriceStore;

/// Result of one retention pass.
#[derive(Debug, Clone, Serialize)]
pub struct RetentionSummary {
    pub retention_days: u32,
    pub cutoff: DateTime<Utc>,
    pub ended_event_count: usize,
    pub deleted_hourly_rows: u64,
}

/// Prunes hourly price rows for ended events beyond the horizon.
pub struct RetentionEnforcer {
    store: Arc<dyn PriceStore>,
    retention_days: u32,
}

impl RetentionEnforcer {
    /// Creates an enforcer with the given horizon in days.
    #[must_use]
    pub fn new(store: Arc<dyn PriceStore>, retention_days: u32) -> Self {
        Self {
            store,
            retention_days,
        }
    }

    /// Runs one retention pass at the given clock.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn enforce(&self, now: DateTime<Utc>) -> Result<RetentionSummary, PricefeedError> {
        let cutoff = now - Duration::days(i64::from(self.retention_days));
        let ended = self.store.ended_event_ids(now).await?;
        let deleted = self.store.delete_hourly_before(&ended, cutoff).await?;

        if deleted > 0 {
            tracing::info!(
                retention_days = self.retention_days,
                %cutoff,
                ended_events = ended.len(),
                deleted_rows = deleted,
                "pruned hourly price rows"
            );
        }

        Ok(RetentionSummary {
            retention_days: self.retention_days,
            cutoff,
            ended_event_count: ended.len(),
            deleted_hourly_rows: deleted,
        })
    }
}
