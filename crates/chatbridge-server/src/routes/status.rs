//! Status and server info routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(get_status))
        .route("/server-info", get(get_server_info))
}

/// GET /api/status: tiers, live sessions and pending relay requests.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<chatbridge_runtime::BridgeStatus> {
    Json(state.bridge.status())
}

/// GET /api/server-info
async fn get_server_info(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "chatbridge",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.config.port,
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "dataDir": state.config.data_paths.root.display().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::Method;

    use crate::routes::test_support::{app, call};

    #[tokio::test]
    async fn test_status_reports_tiers_and_relay() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), true);

        let (status, body) = call(&router, Method::GET, "/api/status", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["tiers"], serde_json::json!(["browser"]));
        assert_eq!(body["relayEnabled"], true);
        assert_eq!(body["pendingRelays"], 0);
        assert_eq!(body["sessions"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_server_info() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), true);

        let (status, body) = call(&router, Method::GET, "/api/server-info", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["name"], "chatbridge");
    }
}
