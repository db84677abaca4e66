pub mod admin;
pub mod payments;
pub mod webhooks;

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::db::AppState;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// The full HTTP surface with tracing.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Payment page (signed token, legacy token or bearer identity)
        .merge(payments::router())
        // Gateway callbacks (signature auth)
        .merge(webhooks::router())
        // Admin tooling (API key auth)
        .merge(admin::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
