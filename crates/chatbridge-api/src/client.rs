//! Stateless request/response client for the AI service's HTTP API.
//!
//! OpenAI and Groq share the chat-completions format. Anthropic uses the
//! Messages API.

use std::sync::Arc;
use std::time::Duration;

use chatbridge_core::{Error, Result, Tier};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::http::{HttpTransport, ReqwestTransport};
use crate::types::{ApiProvider, ChatMessage, CompletionOptions, HttpResponse};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_PROBE_MODEL: &str = "claude-3-5-haiku-20241022";

/// API tier transport. Holds no per-session state.
pub struct ApiClient {
    config: ApiConfig,
    http: Arc<dyn HttpTransport>,
}

impl ApiClient {
    pub fn new(config: ApiConfig, http: Arc<dyn HttpTransport>) -> Self {
        Self { config, http }
    }

    /// Client backed by reqwest with the configured request timeout.
    pub fn with_reqwest(config: ApiConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs.max(1));
        let http = Arc::new(ReqwestTransport::new(timeout)?);
        Ok(Self::new(config, http))
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn provider(&self) -> ApiProvider {
        self.config.provider
    }

    fn headers(&self, api_key: &str) -> Vec<(String, String)> {
        match self.config.provider {
            ApiProvider::Anthropic => vec![
                ("x-api-key".into(), api_key.into()),
                ("anthropic-version".into(), ANTHROPIC_VERSION.into()),
                ("Content-Type".into(), "application/json".into()),
            ],
            ApiProvider::OpenAI | ApiProvider::Groq => vec![
                ("Authorization".into(), format!("Bearer {}", api_key)),
                ("Content-Type".into(), "application/json".into()),
            ],
        }
    }

    /// Probe the API with `api_key`. Never errors: any failure is `false`.
    pub async fn verify_credentials(&self, api_key: &str) -> bool {
        let base = self.config.base_url();
        let headers = self.headers(api_key);

        let result = match self.config.provider {
            ApiProvider::Anthropic => {
                let body = json!({
                    "model": ANTHROPIC_PROBE_MODEL,
                    "max_tokens": 1,
                    "messages": [{"role": "user", "content": "Hi"}],
                });
                self.http
                    .post(&format!("{}/messages", base), &headers, &body)
                    .await
            }
            ApiProvider::OpenAI | ApiProvider::Groq => {
                self.http.get(&format!("{}/models", base), &headers).await
            }
        };

        match result {
            // 400 with a valid key means the key works (quota/model issue)
            Ok(resp) if self.config.provider == ApiProvider::Anthropic && resp.status == 400 => {
                true
            }
            Ok(resp) if resp.is_success() => true,
            Ok(resp) => {
                debug!("API credential probe rejected with status {}", resp.status);
                false
            }
            Err(e) => {
                warn!("API credential probe failed: {}", e);
                false
            }
        }
    }

    /// Submit `prompt` and return the generated text.
    pub async fn complete(
        &self,
        api_key: &str,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model().to_string());
        let temperature = options.temperature.unwrap_or(self.config.temperature);
        let max_tokens = options.max_tokens.unwrap_or(self.config.max_tokens);
        let messages = vec![ChatMessage::user(prompt)];

        let base = self.config.base_url();
        let (url, body) = match self.config.provider {
            ApiProvider::Anthropic => (
                format!("{}/messages", base),
                json!({
                    "model": model,
                    "messages": messages,
                    "temperature": temperature,
                    "max_tokens": max_tokens,
                }),
            ),
            ApiProvider::OpenAI | ApiProvider::Groq => (
                format!("{}/chat/completions", base),
                json!({
                    "model": model,
                    "messages": messages,
                    "temperature": temperature,
                    "max_tokens": max_tokens,
                    "stream": false,
                }),
            ),
        };

        debug!("Completing via {} with model {}", self.config.provider, model);

        let response = self
            .http
            .post(&url, &self.headers(api_key), &body)
            .await
            .map_err(|e| Error::transport(Tier::Api, e.to_string()))?;

        if !response.is_success() {
            return Err(upstream_error(&response));
        }

        let parsed: Value = serde_json::from_str(&response.body).map_err(|e| {
            Error::transport(Tier::Api, format!("Malformed response body: {}", e))
        })?;

        let text = if self.config.provider.is_openai_compatible() {
            parsed["choices"][0]["message"]["content"]
                .as_str()
                .map(str::to_string)
        } else {
            let blocks: Vec<&str> = parsed["content"]
                .as_array()
                .map(|blocks| {
                    blocks
                        .iter()
                        .filter(|b| b["type"] == "text")
                        .filter_map(|b| b["text"].as_str())
                        .collect()
                })
                .unwrap_or_default();
            (!blocks.is_empty()).then(|| blocks.concat())
        };

        text.ok_or_else(|| Error::Transport {
            tier: Tier::Api,
            status: Some(response.status),
            message: "Response contained no completion text".into(),
        })
    }
}

/// Build a transport error from a non-success response, preferring the
/// upstream's own error message over the raw body.
fn upstream_error(response: &HttpResponse) -> Error {
    let message = serde_json::from_str::<Value>(&response.body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| {
            let body = response.body.trim();
            if body.is_empty() {
                "empty response".to_string()
            } else {
                body.chars().take(500).collect()
            }
        });
    Error::Transport {
        tier: Tier::Api,
        status: Some(response.status),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHttp;

    fn client(provider: ApiProvider, http: Arc<FakeHttp>) -> ApiClient {
        let config = ApiConfig {
            provider,
            ..Default::default()
        };
        ApiClient::new(config, http)
    }

    #[tokio::test]
    async fn test_verify_openai_uses_models_listing() {
        let http = Arc::new(FakeHttp::default());
        http.push(200, r#"{"data": []}"#);
        let client = client(ApiProvider::OpenAI, http.clone());

        assert!(client.verify_credentials("sk-good").await);
        let calls = http.calls();
        assert_eq!(calls[0].method, "GET");
        assert_eq!(calls[0].url, "https://api.openai.com/v1/models");
        assert!(calls[0]
            .headers
            .contains(&("Authorization".to_string(), "Bearer sk-good".to_string())));
    }

    #[tokio::test]
    async fn test_verify_never_errors() {
        let http = Arc::new(FakeHttp::default());
        http.push(401, r#"{"error": {"message": "bad key"}}"#);
        http.push_error("connection refused");
        let client = client(ApiProvider::OpenAI, http);

        assert!(!client.verify_credentials("sk-bad").await);
        assert!(!client.verify_credentials("sk-bad").await);
    }

    #[tokio::test]
    async fn test_verify_anthropic_accepts_400() {
        let http = Arc::new(FakeHttp::default());
        http.push(400, r#"{"error": {"message": "credit balance too low"}}"#);
        let client = client(ApiProvider::Anthropic, http.clone());
        assert!(client.verify_credentials("key").await);
        assert_eq!(http.calls()[0].url, "https://api.anthropic.com/v1/messages");
    }

    #[tokio::test]
    async fn test_complete_openai() {
        let http = Arc::new(FakeHttp::default());
        http.push(200, r#"{"choices": [{"message": {"role": "assistant", "content": "Paris"}}]}"#);
        let client = client(ApiProvider::OpenAI, http.clone());

        let options = CompletionOptions {
            model: Some("gpt-4o".into()),
            temperature: Some(0.2),
            max_tokens: None,
        };
        let text = client
            .complete("sk", "Capital of France?", &options)
            .await
            .unwrap();
        assert_eq!(text, "Paris");

        let body = http.calls()[0].body.clone().unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["max_tokens"], 2048);
        assert_eq!(body["messages"][0]["content"], "Capital of France?");
    }

    #[tokio::test]
    async fn test_complete_anthropic_joins_text_blocks() {
        let http = Arc::new(FakeHttp::default());
        http.push(
            200,
            r#"{"content": [{"type": "text", "text": "Hello, "}, {"type": "text", "text": "world"}]}"#,
        );
        let client = client(ApiProvider::Anthropic, http.clone());
        let text = client
            .complete("key", "greet", &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "Hello, world");
        let call = &http.calls()[0];
        assert!(call
            .headers
            .contains(&("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string())));
        assert_eq!(call.body.as_ref().unwrap()["model"], crate::config::DEFAULT_ANTHROPIC_MODEL);
    }

    #[tokio::test]
    async fn test_complete_non_success_carries_status_and_message() {
        let http = Arc::new(FakeHttp::default());
        http.push(429, r#"{"error": {"message": "Rate limit reached"}}"#);
        let client = client(ApiProvider::OpenAI, http);

        let err = client
            .complete("sk", "hi", &CompletionOptions::default())
            .await
            .unwrap_err();
        match err {
            Error::Transport {
                tier,
                status,
                message,
            } => {
                assert_eq!(tier, Tier::Api);
                assert_eq!(status, Some(429));
                assert_eq!(message, "Rate limit reached");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_complete_network_failure_is_transport_error() {
        let http = Arc::new(FakeHttp::default());
        http.push_error("dns failure");
        let client = client(ApiProvider::Groq, http);
        let err = client
            .complete("sk", "hi", &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { status: None, .. }));
        assert!(err.is_tier_failure());
    }

    #[tokio::test]
    async fn test_complete_without_text_fails() {
        let http = Arc::new(FakeHttp::default());
        http.push(200, r#"{"choices": []}"#);
        let client = client(ApiProvider::OpenAI, http);
        assert!(client
            .complete("sk", "hi", &CompletionOptions::default())
            .await
            .is_err());
    }
}
