//! Hour-bucket run lock lifecycle.
//!
//! The unique `hour_bucket` key on `poller_runs` is the only mutual
//! exclusion primitive in the system: whoever inserts the row owns the
//! hour. A crashed owner leaves `finished_at` NULL; once its
//! `started_at` falls behind the stale window the next invocation may
//! reclaim the row with a conditional update, and the rows-affected
//! count arbitrates between concurrent reclaimers.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::PricefeedError;
use crate::persistence::store::{PriceStore, RunCompletion};

/// Result of trying to take the hour lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// This invocation owns the hour and must run the poll.
    Acquired,
    /// A previous run for this hour already finished.
    AlreadyRan,
    /// Another unfinished run holds the lock and is not stale yet.
    AlreadyRunning,
}

/// Coordinates run-row acquisition, stale reclaim, and finalization.
pub struct RunCoordinator {
    store: Arc<dyn PriceStore>,
    stale_lock: Duration,
}

impl RunCoordinator {
    /// Creates a coordinator with the given stale-lock window.
    #[must_use]
    pub fn new(store: Arc<dyn PriceStore>, stale_lock_minutes: i64) -> Self {
        Self {
            store,
            stale_lock: Duration::minutes(stale_lock_minutes),
        }
    }

    /// Attempts to take the lock for `hour_bucket`.
    ///
    /// # Errors
    ///
    /// Propagates store failures; those abort the whole invocation.
    pub async fn acquire(
        &self,
        hour_bucket: DateTime<Utc>,
        batch_size: i32,
        now: DateTime<Utc>,
    ) -> Result<AcquireOutcome, PricefeedError> {
        if self.store.insert_run(hour_bucket, batch_size, now).await? {
            tracing::info!(%hour_bucket, "acquired hour lock");
            return Ok(AcquireOutcome::Acquired);
        }

        let Some(existing) = self.store.run(hour_bucket).await? else {
            // Insert conflicted but the row is gone; someone is mid-flight.
            return Ok(AcquireOutcome::AlreadyRunning);
        };

        if existing.finished_at.is_some() {
            return Ok(AcquireOutcome::AlreadyRan);
        }

        let stale_before = now - self.stale_lock;
        if existing.started_at < stale_before {
            if self
                .store
                .reclaim_stale_run(hour_bucket, stale_before, now, batch_size)
                .await?
            {
                tracing::warn!(
                    %hour_bucket,
                    abandoned_started_at = %existing.started_at,
                    "reclaimed stale hour lock"
                );
                return Ok(AcquireOutcome::Acquired);
            }
            // Lost the reclaim race to another invocation.
            return Ok(AcquireOutcome::AlreadyRunning);
        }

        Ok(AcquireOutcome::AlreadyRunning)
    }

    /// Writes the terminal state of the run row.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn finalize(
        &self,
        hour_bucket: DateTime<Utc>,
        completion: &RunCompletion,
    ) -> Result<(), PricefeedError> {
        self.store.finalize_run(hour_bucket, completion).await
    }
}
