//! Hourly poll trigger.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use chrono::Utc;

use crate::api::dto::HourlyPollResponse;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, PricefeedError};

/// `POST /jobs/hourly` — Capture price aggregates for the current hour.
///
/// Fired once per hour by the external scheduler. The hour-bucket lock
/// makes retried deliveries harmless: a second invocation for the same
/// hour reports `skipped`.
///
/// # Errors
///
/// Returns [`PricefeedError`] when the run aborts at coordinator level
/// (lock or event-set read failure); per-event failures are folded into
/// the run classification instead.
#[utoipa::path(
    post,
    path = "/jobs/hourly",
    tag = "Jobs",
    summary = "Run the hourly price poll",
    description = "Acquires the hour-bucket lock and captures hourly price aggregates for every active event. Safe to retry: repeated invocations for the same hour are skipped.",
    responses(
        (status = 200, description = "Run completed or was skipped", body = HourlyPollResponse),
        (status = 500, description = "Coordinator-level failure", body = ErrorResponse),
    )
)]
pub async fn hourly_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, PricefeedError> {
    let outcome = state.poller.run_hour(Utc::now()).await?;
    Ok(Json(HourlyPollResponse::from(outcome)))
}

/// Hourly job route.
pub fn routes() -> Router<AppState> {
    Router::new().route("/jobs/hourly", post(hourly_handler))
}
