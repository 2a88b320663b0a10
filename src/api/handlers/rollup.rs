//! Daily rollup and retention trigger.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use chrono::Utc;

use crate::api::dto::DailyRollupResponse;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, PricefeedError};

/// `POST /jobs/daily` — Roll hourly rows into daily rows, then prune.
///
/// Invokes the storage-side `rollup_hourly_to_daily()` procedure and
/// follows with a retention pass over ended events. Both steps are
/// idempotent, so scheduler retries are safe.
///
/// # Errors
///
/// Returns [`PricefeedError`] on store failure.
#[utoipa::path(
    post,
    path = "/jobs/daily",
    tag = "Jobs",
    summary = "Run the daily rollup and retention pass",
    description = "Aggregates hourly rows into daily rows via the storage-side procedure, then deletes hourly rows of ended events beyond the retention horizon.",
    responses(
        (status = 200, description = "Rollup and retention completed", body = DailyRollupResponse),
        (status = 500, description = "Store failure", body = ErrorResponse),
    )
)]
pub async fn daily_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, PricefeedError> {
    let rolled_up_rows = state.store.rollup_hourly_to_daily().await?;
    let retention = state.retention.enforce(Utc::now()).await?;

    tracing::info!(
        rolled_up_rows,
        deleted_hourly_rows = retention.deleted_hourly_rows,
        "daily job finished"
    );

    Ok(Json(DailyRollupResponse {
        rolled_up_rows,
        retention: retention.into(),
    }))
}

/// Daily job route.
pub fn routes() -> Router<AppState> {
    Router::new().route("/jobs/daily", post(daily_handler))
}
