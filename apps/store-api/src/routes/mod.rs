//! HTTP route table.
//!
//! ```text
//! /health                              liveness, no auth
//! /api/...                             bearer token
//! /webhooks/*topic                     HMAC signature, no bearer token
//! ```

pub mod inventory;
pub mod orders;
pub mod webhooks;

use axum::extract::State;
use axum::middleware;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer;
use crate::response::Envelope;
use crate::state::AppState;

/// Builds the full application router.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/orders", post(orders::create_order).get(orders::list_orders))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/status", patch(orders::update_status))
        .route("/orders/:id/payments", post(orders::apply_payment))
        .route("/inventory/update-stock", post(inventory::update_stock))
        .route(
            "/inventory/bulk-update-stock",
            post(inventory::bulk_update_stock),
        )
        .route("/inventory/:product_id/stock", get(inventory::get_stock))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_bearer,
        ));

    Router::new()
        .nest("/api", api)
        .route("/webhooks/*topic", post(webhooks::handle))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /health`
async fn health(State(state): State<AppState>) -> Json<Envelope<serde_json::Value>> {
    let healthy = state.db.health_check().await;
    Json(Envelope::ok(
        "Health",
        serde_json::json!({ "database": healthy }),
    ))
}
