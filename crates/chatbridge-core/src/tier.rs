//! Transport tiers, in escalation order.

use serde::{Deserialize, Serialize};

/// Transport strategy used to obtain a response.
///
/// Ordering follows escalation: `Api < Browser < Human`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Direct authenticated HTTP API.
    Api,
    /// Automated browser session driving the web UI.
    Browser,
    /// Human-in-the-loop relay.
    Human,
}

impl Tier {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Browser => "browser",
            Self::Human => "human",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "api" => Some(Self::Api),
            "browser" => Some(Self::Browser),
            "human" => Some(Self::Human),
            _ => None,
        }
    }

    /// Whether the tier is served by an automated transport.
    pub fn is_automated(&self) -> bool {
        !matches!(self, Self::Human)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
