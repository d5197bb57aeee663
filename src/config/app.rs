use std::path::Path;
use std::time::Duration;

use super::error::ConfigError;
use super::server::ServerConfig;

/// Application configuration loaded from bridge.toml
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Where the legacy service publishes its API description.
    pub openapi_url: String,
    /// Base URL the compiled descriptors are invoked against.
    pub base_url: String,
    pub startup_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub servers: Vec<ServerConfig>,
}

impl AppConfig {
    /// Load configuration from a file path (or the default path if None).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        super::loader::load_config(path)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
