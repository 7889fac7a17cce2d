//! Session lifecycle and prompt routes.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chatbridge_runtime::{RequestOptions, SessionOptions};
use serde::Deserialize;

use super::{bad_request, error_response};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/{id}", get(get_session).delete(close_session))
        .route("/sessions/{id}/response", post(session_response))
        .route("/respond", post(respond))
}

#[derive(Deserialize)]
struct PromptRequest {
    prompt: String,
    #[serde(flatten)]
    options: RequestOptions,
}

/// GET /api/sessions
async fn list_sessions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sessions = state.bridge.status().sessions;
    Json(serde_json::json!({
        "sessions": sessions,
        "total": sessions.len(),
    }))
}

/// POST /api/sessions: open a session on the first tier that works.
///
/// The body is optional; an empty body uses default options.
async fn create_session(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let options = if body.is_empty() {
        SessionOptions::default()
    } else {
        match serde_json::from_slice::<SessionOptions>(&body) {
            Ok(options) => options,
            Err(e) => return bad_request(&format!("Invalid session options: {}", e)),
        }
    };

    let session_id = match state.bridge.create_session(options).await {
        Ok(id) => id,
        Err(e) => return error_response(&e),
    };
    match state.bridge.session(&session_id) {
        Ok(record) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "sessionId": session_id,
                "tier": record.tier,
                "authenticated": record.authenticated,
            })),
        ),
        Err(e) => error_response(&e),
    }
}

/// GET /api/sessions/{id}
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.bridge.session(&id) {
        Ok(record) => (StatusCode::OK, Json(serde_json::json!(record.snapshot()))),
        Err(e) => error_response(&e),
    }
}

/// DELETE /api/sessions/{id}
async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let closed = state.bridge.close_session(&id).await;
    Json(serde_json::json!({ "closed": closed }))
}

/// POST /api/sessions/{id}/response: answer a prompt, escalating as needed.
async fn session_response(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PromptRequest>,
) -> impl IntoResponse {
    if req.prompt.trim().is_empty() {
        return bad_request("prompt is required");
    }
    match state.bridge.get_response(&id, &req.prompt, req.options).await {
        Ok(text) => (StatusCode::OK, Json(answer_body(Some(&id), text))),
        Err(e) => error_response(&e),
    }
}

/// POST /api/respond: open, answer and close in one call.
async fn respond(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PromptRequest>,
) -> impl IntoResponse {
    if req.prompt.trim().is_empty() {
        return bad_request("prompt is required");
    }
    match state.bridge.respond(&req.prompt, req.options).await {
        Ok(text) => (StatusCode::OK, Json(answer_body(None, text))),
        Err(e) => error_response(&e),
    }
}

fn answer_body(session_id: Option<&str>, text: Option<String>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "cancelled": text.is_none(),
        "text": text,
    });
    if let Some(id) = session_id {
        body["sessionId"] = serde_json::json!(id);
    }
    body
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::Method;
    use serde_json::json;

    use crate::routes::test_support::{app, call};

    async fn open(router: &axum::Router) -> String {
        let (status, body) = call(router, Method::POST, "/api/sessions", None).await;
        assert_eq!(status, 201);
        body["sessionId"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_create_session_reports_tier() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), false);

        let (status, body) = call(
            &router,
            Method::POST,
            "/api/sessions",
            Some(json!({ "model": "gpt-4o" })),
        )
        .await;
        assert_eq!(status, 201);
        assert_eq!(body["tier"], "browser");
        assert_eq!(body["authenticated"], false);

        let id = body["sessionId"].as_str().unwrap();
        let (status, body) = call(&router, Method::GET, &format!("/api/sessions/{}", id), None).await;
        assert_eq!(status, 200);
        assert_eq!(body["model"], "gpt-4o");
    }

    #[tokio::test]
    async fn test_session_response_round() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), false);
        let id = open(&router).await;

        let (status, body) = call(
            &router,
            Method::POST,
            &format!("/api/sessions/{}/response", id),
            Some(json!({ "prompt": "hello", "temperature": 0.2 })),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["text"], "echo: hello");
        assert_eq!(body["cancelled"], false);
        assert_eq!(body["sessionId"], id.as_str());
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), false);
        let id = open(&router).await;

        let (status, body) = call(
            &router,
            Method::POST,
            &format!("/api/sessions/{}/response", id),
            Some(json!({ "prompt": "  " })),
        )
        .await;
        assert_eq!(status, 400);
        assert!(body["error"].as_str().unwrap().contains("prompt"));
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), false);

        let (status, _) = call(
            &router,
            Method::POST,
            "/api/sessions/nope/response",
            Some(json!({ "prompt": "hi" })),
        )
        .await;
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn test_exhausted_without_relay_is_502() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), false);
        let id = open(&router).await;

        let (status, body) = call(
            &router,
            Method::POST,
            &format!("/api/sessions/{}/response", id),
            Some(json!({ "prompt": "fail" })),
        )
        .await;
        assert_eq!(status, 502);
        assert!(body["error"].as_str().unwrap().contains("exhausted"));
    }

    #[tokio::test]
    async fn test_close_session_once() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), false);
        let id = open(&router).await;
        let uri = format!("/api/sessions/{}", id);

        let (_, body) = call(&router, Method::DELETE, &uri, None).await;
        assert_eq!(body["closed"], true);
        let (_, body) = call(&router, Method::DELETE, &uri, None).await;
        assert_eq!(body["closed"], false);

        let (_, body) = call(&router, Method::GET, "/api/sessions", None).await;
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn test_respond_leaves_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let (router, state) = app(dir.path(), false);

        let (status, body) = call(
            &router,
            Method::POST,
            "/api/respond",
            Some(json!({ "prompt": "one shot" })),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["text"], "echo: one shot");
        assert!(body.get("sessionId").is_none());
        assert!(state.bridge.status().sessions.is_empty());
    }

    #[tokio::test]
    async fn test_human_relay_answers_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let (router, _) = app(dir.path(), true);
        let id = open(&router).await;

        let waiting = {
            let router = router.clone();
            let uri = format!("/api/sessions/{}/response", id);
            tokio::spawn(async move {
                call(&router, Method::POST, &uri, Some(json!({ "prompt": "fail" }))).await
            })
        };

        let request_id = loop {
            let (_, body) = call(&router, Method::GET, "/api/relay/pending", None).await;
            if let Some(first) = body["pending"].as_array().and_then(|p| p.first()) {
                break first["requestId"].as_str().unwrap().to_string();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        let (status, body) = call(
            &router,
            Method::POST,
            "/api/relay/deliver",
            Some(json!({ "requestId": request_id, "text": "from a human" })),
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["delivered"], true);

        let (status, body) = waiting.await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(body["text"], "from a human");
    }
}
