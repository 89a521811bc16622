//! Axum router wiring.
//!
//! Exposes `/` for every HTTP method; anything else is a plain 404.

use axum::{routing::any, Router};

use crate::{app_state::AppState, metrics};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(metrics::metrics_report))
        .with_state(state)
}
