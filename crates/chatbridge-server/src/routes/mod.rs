//! HTTP route handlers.

pub mod relay;
pub mod sessions;
pub mod status;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::{Json, Router};
use chatbridge_core::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(status::routes())
        .merge(sessions::routes())
        .merge(relay::routes())
}

pub type ApiError = (StatusCode, Json<serde_json::Value>);

/// Map a bridge error to a JSON error response.
pub fn error_response(err: &Error) -> ApiError {
    let status = match err {
        Error::SessionNotFound(_) => StatusCode::NOT_FOUND,
        Error::AllTiersExhausted { .. } => StatusCode::BAD_GATEWAY,
        Error::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
        Error::Config(_) => StatusCode::BAD_REQUEST,
        Error::ResponseTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!("Request failed: {}", err);
    }
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}

pub fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use axum::Router;
    use chatbridge_core::{BridgeConfig, Error, Result, Tier};
    use chatbridge_runtime::{ChatBridge, RequestOptions, TierStrategy};
    use tower::ServiceExt;

    use crate::state::AppState;

    /// Browser-tier stand-in: answers by echoing, fails on "fail".
    pub struct EchoTier;

    #[async_trait]
    impl TierStrategy for EchoTier {
        fn tier(&self) -> Tier {
            Tier::Browser
        }

        async fn available(&self) -> bool {
            true
        }

        async fn establish(&self, _session_id: &str) -> Result<bool> {
            Ok(false)
        }

        async fn attempt(
            &self,
            _session_id: &str,
            prompt: &str,
            _options: &RequestOptions,
        ) -> Result<String> {
            if prompt == "fail" {
                Err(Error::transport(Tier::Browser, "page crashed"))
            } else {
                Ok(format!("echo: {}", prompt))
            }
        }

        async fn release(&self, _session_id: &str) -> Result<()> {
            Ok(())
        }
    }

    pub fn app(dir: &std::path::Path, relay_enabled: bool) -> (Router, Arc<AppState>) {
        let mut config = BridgeConfig::with_defaults(dir).unwrap();
        config.relay_enabled = relay_enabled;
        let bridge = ChatBridge::with_tiers(&config, vec![Arc::new(EchoTier)]);
        let state = Arc::new(AppState::new(config, bridge));
        (super::build_router(state.clone()), state)
    }

    pub async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (u16, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status().as_u16();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }
}
