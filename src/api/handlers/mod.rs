//! HTTP endpoint handlers, one module per job plus system routes.

pub mod poll;
pub mod refresh;
pub mod rollup;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all job routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(poll::routes())
        .merge(rollup::routes())
        .merge(refresh::routes())
}
