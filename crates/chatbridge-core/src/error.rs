//! Error types for ChatBridge.

use thiserror::Error;

use crate::tier::Tier;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("{tier} transport error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Transport {
        tier: Tier,
        status: Option<u16>,
        message: String,
    },

    #[error("{tier} response timed out after {timeout_ms}ms")]
    ResponseTimeout { tier: Tier, timeout_ms: u64 },

    #[error("All tiers exhausted: {last}")]
    AllTiersExhausted { last: Box<Error> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Transport failure on `tier` without an upstream status code.
    pub fn transport(tier: Tier, message: impl Into<String>) -> Self {
        Self::Transport {
            tier,
            status: None,
            message: message.into(),
        }
    }

    /// Wrap the last underlying failure once no tier is left to try.
    pub fn exhausted(last: Error) -> Self {
        match last {
            exhausted @ Self::AllTiersExhausted { .. } => exhausted,
            other => Self::AllTiersExhausted {
                last: Box::new(other),
            },
        }
    }

    /// Whether the coordinator should treat this error as a failed tier and
    /// escalate, rather than surface it directly.
    pub fn is_tier_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::ResponseTimeout { .. }
                | Self::AuthenticationFailed(_)
                | Self::SessionNotFound(_)
                | Self::Http(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display_includes_status() {
        let err = Error::Transport {
            tier: Tier::Api,
            status: Some(503),
            message: "overloaded".into(),
        };
        assert_eq!(err.to_string(), "api transport error (503): overloaded");
        assert_eq!(
            Error::transport(Tier::Browser, "page crashed").to_string(),
            "browser transport error: page crashed"
        );
    }

    #[test]
    fn test_exhausted_does_not_nest() {
        let once = Error::exhausted(Error::ResponseTimeout {
            tier: Tier::Browser,
            timeout_ms: 60_000,
        });
        let twice = Error::exhausted(once);
        match twice {
            Error::AllTiersExhausted { last } => {
                assert!(matches!(*last, Error::ResponseTimeout { .. }))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_tier_failure_classification() {
        assert!(Error::transport(Tier::Api, "x").is_tier_failure());
        assert!(Error::SessionNotFound("s".into()).is_tier_failure());
        assert!(!Error::Config("bad".into()).is_tier_failure());
        assert!(!Error::exhausted(Error::Http("x".into())).is_tier_failure());
    }
}
