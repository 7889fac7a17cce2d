//! Scripted `HttpTransport` for unit tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use chatbridge_core::{Error, Result};
use parking_lot::Mutex;

use crate::http::HttpTransport;
use crate::types::HttpResponse;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

#[derive(Default)]
pub struct FakeHttp {
    responses: Mutex<VecDeque<Result<HttpResponse>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeHttp {
    pub fn push(&self, status: u16, body: &str) {
        self.responses.lock().push_back(Ok(HttpResponse {
            status,
            body: body.to_string(),
        }));
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .push_back(Err(Error::Http(message.to_string())));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    fn next(&self, call: RecordedCall) -> Result<HttpResponse> {
        self.calls.lock().push(call);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Http("no scripted response".into())))
    }
}

#[async_trait]
impl HttpTransport for FakeHttp {
    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<HttpResponse> {
        self.next(RecordedCall {
            method: "GET",
            url: url.to_string(),
            headers: headers.to_vec(),
            body: None,
        })
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &serde_json::Value,
    ) -> Result<HttpResponse> {
        self.next(RecordedCall {
            method: "POST",
            url: url.to_string(),
            headers: headers.to_vec(),
            body: Some(body.clone()),
        })
    }
}
