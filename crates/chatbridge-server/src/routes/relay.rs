//! Human relay routes: operators list waiting prompts and answer them.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chatbridge_runtime::RelayResponse;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/relay/pending", get(list_pending))
        .route("/relay/deliver", post(deliver))
}

/// GET /api/relay/pending
async fn list_pending(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let pending = state.bridge.pending_relays();
    Json(serde_json::json!({
        "pending": pending,
        "total": pending.len(),
    }))
}

/// POST /api/relay/deliver: `delivered` is false when nothing was waiting.
async fn deliver(
    State(state): State<Arc<AppState>>,
    Json(response): Json<RelayResponse>,
) -> impl IntoResponse {
    let delivered = state.bridge.deliver_human_relay_response(response);
    Json(serde_json::json!({ "delivered": delivered }))
}
