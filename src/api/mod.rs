//! HTTP API layer: route handlers, DTOs, and router composition.
//!
//! The invocation surface is small by design: three POST job triggers
//! fired by an external scheduler, plus a health check.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI documentation for the olt-pricefeed service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "olt-pricefeed",
        version = "0.1.0",
        description = "Hourly ticket price-history ingestion service backed by the Ticket Evolution API.",
        license(name = "MIT"),
    ),
    tags(
        (name = "System", description = "Health check"),
        (name = "Jobs", description = "Scheduler-triggered ingestion jobs"),
    ),
    paths(
        handlers::system::health_handler,
        handlers::poll::hourly_handler,
        handlers::rollup::daily_handler,
        handlers::refresh::refresh_metadata_handler,
    ),
    components(schemas(
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
        dto::HealthResponse,
        dto::HourlyPollResponse,
        dto::RunCountersDto,
        dto::DailyRollupResponse,
        dto::RetentionSummaryDto,
        dto::RefreshRequest,
        dto::RefreshResponse,
        dto::RefreshEventDto,
    ))
)]
#[derive(Debug)]
pub struct ApiDoc;

/// Builds the complete router with all endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .merge(handlers::routes())
        .merge(handlers::system::routes())
}
