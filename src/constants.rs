//! Application constants
//!
//! Single source of truth for paths and defaults.

/// Default configuration file path
pub const CONFIG_PATH: &str = "config/bridge.toml";

/// Default environment file path
pub const ENV_PATH: &str = "config/.env";

/// Legacy service base URL used when no configuration is present
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Time allowed for a provider's spawn-and-handshake sequence
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 15_000;

/// Per-request timeout for provider tool calls
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
