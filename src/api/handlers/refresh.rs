//! Metadata refresh trigger.

use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::post;
use chrono::Utc;

use crate::api::dto::{RefreshQuery, RefreshRequest, RefreshResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, PricefeedError};

/// `POST /jobs/refresh-metadata` — Reconcile event metadata with TE.
///
/// Target selection precedence: query `event_id`, then body `event_id`,
/// then body `te_event_ids`, then every tracked event. `dry_run`
/// defaults to `true`, which makes the default invocation idempotent.
///
/// # Errors
///
/// Returns [`PricefeedError`] when the id list cannot be resolved;
/// per-event failures are reported inside the response body.
#[utoipa::path(
    post,
    path = "/jobs/refresh-metadata",
    tag = "Jobs",
    summary = "Refresh event metadata from TE",
    description = "Fetches each event from TE, derives the proposed field set (title, schedule, lifecycle flags, SEO URL), and reports or applies the differences depending on dry_run.",
    params(RefreshQuery),
    request_body(content = RefreshRequest, description = "Optional target selection and dry_run flag"),
    responses(
        (status = 200, description = "Refresh report", body = RefreshResponse),
        (status = 500, description = "Store failure", body = ErrorResponse),
    )
)]
pub async fn refresh_metadata_handler(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, PricefeedError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();

    let ids = query
        .event_id
        .map(|id| vec![id])
        .or_else(|| request.event_id.map(|id| vec![id]))
        .or_else(|| request.te_event_ids.clone());
    let dry_run = request.dry_run.unwrap_or(true);

    let summary = state.refresher.refresh(ids, dry_run, Utc::now()).await?;
    Ok(Json(RefreshResponse::from(summary)))
}

/// Metadata refresh route.
pub fn routes() -> Router<AppState> {
    Router::new().route("/jobs/refresh-metadata", post(refresh_metadata_handler))
}
