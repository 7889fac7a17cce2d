//! Browser driver configuration persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::LaunchOptions;

/// Placeholder substituted with the requested model in `model_option`.
pub const MODEL_PLACEHOLDER: &str = "{model}";

/// CSS selectors for the service's web UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriverSelectors {
    pub login_button: String,
    pub email_input: String,
    /// Continue button between the email and password steps.
    pub email_continue: String,
    pub password_input: String,
    pub login_submit: String,
    /// Present only once the user is signed in.
    pub authenticated_marker: String,
    pub model_selector: String,
    /// Option inside the model menu; `{model}` is replaced with the model id.
    pub model_option: String,
    pub prompt_input: String,
    pub send_button: String,
    /// Appears when the service has finished generating.
    pub response_complete: String,
    pub response_text: String,
}

impl Default for DriverSelectors {
    fn default() -> Self {
        Self {
            login_button: r#"[data-testid="login-button"]"#.into(),
            email_input: r#"input[type="email"], input[name="email"], input[name="username"]"#
                .into(),
            email_continue: r#"button[type="submit"]"#.into(),
            password_input: r#"input[type="password"]"#.into(),
            login_submit: r#"button[type="submit"]"#.into(),
            authenticated_marker: r#"[data-testid="profile-button"]"#.into(),
            model_selector: r#"[data-testid="model-switcher-dropdown-button"]"#.into(),
            model_option: r#"[data-testid="model-switcher-{model}"]"#.into(),
            prompt_input: "#prompt-textarea".into(),
            send_button: r#"[data-testid="send-button"]"#.into(),
            response_complete: r#"[data-testid="copy-turn-action-button"]"#.into(),
            response_text: r#"[data-message-author-role="assistant"]"#.into(),
        }
    }
}

impl DriverSelectors {
    pub fn model_option_for(&self, model: &str) -> String {
        self.model_option.replace(MODEL_PLACEHOLDER, model)
    }
}

/// Persisted browser driver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserDriverConfig {
    #[serde(default = "default_service_url")]
    pub service_url: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_true")]
    pub stealth: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default = "default_launch_timeout")]
    pub launch_timeout_secs: u64,
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
    #[serde(default)]
    pub selectors: DriverSelectors,
    /// Path to config file (not serialized).
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_true() -> bool {
    true
}
fn default_service_url() -> String {
    "https://chatgpt.com".into()
}
fn default_launch_timeout() -> u64 {
    30
}
fn default_navigation_timeout() -> u64 {
    30
}
fn default_login_timeout() -> u64 {
    15
}
fn default_response_timeout() -> u64 {
    60
}

impl Default for BrowserDriverConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            headless: true,
            stealth: true,
            chrome_path: None,
            user_agent: None,
            launch_timeout_secs: default_launch_timeout(),
            navigation_timeout_secs: default_navigation_timeout(),
            login_timeout_secs: default_login_timeout(),
            response_timeout_secs: default_response_timeout(),
            selectors: DriverSelectors::default(),
            config_path: PathBuf::new(),
        }
    }
}

impl BrowserDriverConfig {
    /// Load config from `config.json` in `config_dir`, or return defaults.
    pub fn load(config_dir: &Path) -> Self {
        let config_path = config_dir.join("config.json");
        let mut config: BrowserDriverConfig = std::fs::read_to_string(&config_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        config.config_path = config_path;
        config
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(&self.config_path, json)
    }

    pub fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            headless: self.headless,
            executable: self.chrome_path.clone(),
            user_agent: self.user_agent.clone(),
            stealth: self.stealth,
            launch_timeout_ms: self.launch_timeout_secs.saturating_mul(1000),
            ..Default::default()
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = BrowserDriverConfig::load(dir.path());
        assert_eq!(config.service_url, "https://chatgpt.com");
        assert_eq!(config.response_timeout(), Duration::from_secs(60));
        assert!(config.headless);
        assert_eq!(config.config_path, dir.path().join("config.json"));
    }

    #[test]
    fn test_partial_selectors_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r##"{"service_url": "https://chat.example.com", "selectors": {"promptInput": "#q"}}"##,
        )
        .unwrap();
        let config = BrowserDriverConfig::load(dir.path());
        assert_eq!(config.service_url, "https://chat.example.com");
        assert_eq!(config.selectors.prompt_input, "#q");
        assert_eq!(
            config.selectors.send_button,
            DriverSelectors::default().send_button
        );
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BrowserDriverConfig::load(&dir.path().join("browser-driver"));
        config.headless = false;
        config.user_agent = Some("Mozilla/5.0 Test".into());
        config.save().unwrap();

        let reloaded = BrowserDriverConfig::load(&dir.path().join("browser-driver"));
        assert!(!reloaded.headless);
        let launch = reloaded.launch_options();
        assert_eq!(launch.user_agent.as_deref(), Some("Mozilla/5.0 Test"));
        assert_eq!(launch.launch_timeout_ms, 30_000);
    }

    #[test]
    fn test_model_option_template() {
        let selectors = DriverSelectors::default();
        assert_eq!(
            selectors.model_option_for("gpt-4o"),
            r#"[data-testid="model-switcher-gpt-4o"]"#
        );
    }
}
