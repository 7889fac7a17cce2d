//! Credential bundle and the read-only providers that supply it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Secret material handed to the transports. Never persisted by the core.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, rename = "apiKey")]
    pub api_key: Option<String>,
    #[serde(default, rename = "loginEmail")]
    pub login_email: Option<String>,
    #[serde(default, rename = "loginPassword")]
    pub login_password: Option<String>,
}

impl Credentials {
    /// API key, ignoring blank values.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    /// Login pair for browser authentication, if both halves are present.
    pub fn login(&self) -> Option<(&str, &str)> {
        match (self.login_email.as_deref(), self.login_password.as_deref()) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Some((email, password))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key().map(|_| "<redacted>"))
            .field("login_email", &self.login_email)
            .field("login_password", &self.login_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Read-only source of credentials, consulted once per session-creation attempt.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> Credentials;
}

/// Fixed credentials, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(pub Credentials);

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Self(Credentials {
            api_key: Some(key.into()),
            ..Default::default()
        })
    }
}

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> Credentials {
        self.0.clone()
    }
}

/// Credentials read from `credentials.json` on every call, with environment
/// variables filling any field the file leaves out.
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialProvider for FileCredentials {
    fn credentials(&self) -> Credentials {
        let mut creds: Credentials = match std::fs::read_to_string(&self.path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                warn!("Ignoring malformed {}: {}", self.path.display(), e);
                Credentials::default()
            }),
            Err(_) => Credentials::default(),
        };

        // Env vars as fallback
        if creds.api_key.is_none() {
            creds.api_key = std::env::var("CHATBRIDGE_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok();
        }
        if creds.login_email.is_none() {
            creds.login_email = std::env::var("CHATBRIDGE_LOGIN_EMAIL").ok();
        }
        if creds.login_password.is_none() {
            creds.login_password = std::env::var("CHATBRIDGE_LOGIN_PASSWORD").ok();
        }

        creds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_api_key_is_absent() {
        let creds = Credentials {
            api_key: Some("   ".into()),
            ..Default::default()
        };
        assert!(creds.api_key().is_none());
    }

    #[test]
    fn test_login_requires_both_halves() {
        let mut creds = Credentials {
            login_email: Some("me@example.com".into()),
            ..Default::default()
        };
        assert!(creds.login().is_none());
        creds.login_password = Some("hunter2".into());
        assert_eq!(creds.login(), Some(("me@example.com", "hunter2")));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials {
            api_key: Some("sk-secret".into()),
            login_email: None,
            login_password: Some("pw".into()),
        };
        let out = format!("{creds:?}");
        assert!(!out.contains("sk-secret"));
        assert!(!out.contains("\"pw\""));
    }

    #[test]
    fn test_file_credentials_reads_file_each_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, r#"{"apiKey": "sk-one"}"#).unwrap();
        let provider = FileCredentials::new(&path);
        assert_eq!(provider.credentials().api_key(), Some("sk-one"));

        std::fs::write(&path, r#"{"apiKey": "sk-two"}"#).unwrap();
        assert_eq!(provider.credentials().api_key(), Some("sk-two"));
    }
}
