//! API tier: credential verification and request/response completions
//! against OpenAI, Anthropic or Groq.

pub mod client;
pub mod config;
pub mod gate;
pub mod http;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::ApiClient;
pub use config::ApiConfig;
pub use gate::{CredentialGate, GateDecision};
pub use http::{HttpTransport, ReqwestTransport};
pub use types::*;
