use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Once;

use dotenvy::from_filename;
use serde::Deserialize;
use tracing::{debug, info};

use crate::constants::{
    CONFIG_PATH, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_STARTUP_TIMEOUT_MS,
    ENV_PATH,
};

use super::AppConfig;
use super::error::ConfigError;
use super::server::{RawServer, ServerConfig};

static ENV_LOADER: Once = Once::new();

/// Raw configuration structure for deserialization from TOML
#[derive(Debug, Deserialize, Default)]
pub(super) struct RawConfig {
    pub openapi_url: Option<String>,
    pub base_url: Option<String>,
    pub startup_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub servers: Vec<RawServer>,
}

/// Ensures environment variables are loaded from config/.env
pub fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| {
        let _ = from_filename(ENV_PATH);
    });
}

/// Load and validate configuration. An explicit path must exist; the
/// default path falls back to built-in defaults when absent.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    ensure_env_loaded();
    match path {
        Some(path) => read_config(path),
        None => {
            let default_path = Path::new(CONFIG_PATH);
            match read_config(default_path) {
                Err(ConfigError::NotFound { .. }) => {
                    info!("configuration file not found; using defaults");
                    validate_and_build(RawConfig::default())
                }
                other => other,
            }
        }
    }
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    debug!(path = %path.display(), "reading bridge configuration file");

    let content = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let parsed: RawConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_and_build(parsed)
}

fn validate_and_build(parsed: RawConfig) -> Result<AppConfig, ConfigError> {
    let base_url = parsed
        .base_url
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    // The legacy service publishes its description next to the API itself.
    let openapi_url = parsed
        .openapi_url
        .unwrap_or_else(|| format!("{}/openapi.json", base_url.trim_end_matches('/')));

    let mut seen = HashSet::new();
    let mut servers: Vec<ServerConfig> = Vec::with_capacity(parsed.servers.len());
    for raw in parsed.servers {
        if raw.name.is_empty() {
            return Err(ConfigError::MissingServerName);
        }
        if !seen.insert(raw.name.clone()) {
            return Err(ConfigError::DuplicateServer { name: raw.name });
        }
        servers.push(ServerConfig::from(raw));
    }

    Ok(AppConfig {
        openapi_url,
        base_url,
        startup_timeout_ms: parsed
            .startup_timeout_ms
            .unwrap_or(DEFAULT_STARTUP_TIMEOUT_MS),
        request_timeout_ms: parsed
            .request_timeout_ms
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        servers,
    })
}
