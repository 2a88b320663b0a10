//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::persistence::store::PriceStore;
use crate::service::{MetadataRefresher, PollerEngine, RetentionEnforcer};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Hourly poller engine (lock + fan-out + classification).
    pub poller: Arc<PollerEngine>,
    /// Metadata refresher.
    pub refresher: Arc<MetadataRefresher>,
    /// Retention enforcer, run by the daily job.
    pub retention: Arc<RetentionEnforcer>,
    /// Store handle for the daily rollup invocation.
    pub store: Arc<dyn PriceStore>,
}
