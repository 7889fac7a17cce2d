//! ChatBridge Core: shared errors, tiers, credentials, configuration.

pub mod config;
pub mod credentials;
pub mod error;
pub mod tier;

pub use config::{BridgeConfig, DataPaths};
pub use credentials::{CredentialProvider, Credentials, FileCredentials, StaticCredentials};
pub use error::{Error, Result};
pub use tier::Tier;
