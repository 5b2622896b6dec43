//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: Hardcoded in struct `Default` implementations
//! 2. **Config file**: TOML file specified by `LITEGATE_CONFIG` env var
//! 3. **Environment variables**: `LITEGATE__*` env vars override specific fields
//!
//! For compatibility with existing deployments, the upstream node list may also
//! be supplied through the `LITE_SERVERS` environment variable as comma-separated
//! `address:port:key` triples, where the address may be a signed-integer IPv4
//! encoding. It is only consulted when the TOML list is empty.
//!
//! # Validation
//!
//! Configuration is validated at load time. An empty lite-server list is a fatal
//! startup condition: no engine pool can be built and the process must not serve
//! traffic.
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! bind_port = 3000
//!
//! [[lite_servers.entries]]
//! address = "1592601963"
//! port = 4924
//! key = "n4VDnSCUuSpjnCyUk9e3QOOd6o0ItSWYbTnW3Wnn8wk="
//!
//! [lite_servers]
//! parallelism = 50
//! engine_batch = 10
//! on_invalid_key = "abort"
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `3000`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Origins allowed by CORS. An empty list allows any origin.
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    3000
}

/// One configured upstream lite server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteServerEntry {
    /// Hostname, dotted quad, or signed-integer IPv4 encoding.
    pub address: String,

    /// TCP port of the lite-server session bridge.
    pub port: u16,

    /// Base64-encoded 32-byte session public key.
    pub key: String,
}

/// Policy applied when a configured lite-server entry fails to parse.
///
/// Either choice is deterministic and logged; `Skip` that excludes every node
/// degenerates to the fatal empty-configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidKeyPolicy {
    /// Fail pool construction entirely. The default.
    Abort,
    /// Exclude the malformed node with a warning and continue.
    Skip,
}

impl std::fmt::Display for InvalidKeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Upstream lite-server pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteServersConfig {
    /// Configured upstream nodes. Cannot be empty after loading.
    #[serde(default)]
    pub entries: Vec<LiteServerEntry>,

    /// Parallel sessions opened per node. Defaults to `50`.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// In-flight request ceiling of one engine's client. Defaults to `10`.
    #[serde(default = "default_engine_batch")]
    pub engine_batch: usize,

    /// Handling of entries whose key or address fails to parse.
    #[serde(default = "default_invalid_key_policy")]
    pub on_invalid_key: InvalidKeyPolicy,

    /// Per-request timeout towards upstream nodes, in seconds. Defaults to `30`.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_parallelism() -> usize {
    50
}

fn default_engine_batch() -> usize {
    10
}

fn default_invalid_key_policy() -> InvalidKeyPolicy {
    InvalidKeyPolicy::Abort
}

fn default_request_timeout_seconds() -> u64 {
    30
}

/// Block synchronization tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Interval between head polls, in milliseconds. Defaults to `1000`.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Queued events per subscriber before it is dropped as too slow.
    /// Defaults to `32`.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_subscriber_buffer() -> usize {
    32
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g. "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// Root application configuration containing all subsystem settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment environment (e.g. "development", "production").
    #[serde(default = "default_environment")]
    pub environment: String,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream lite-server pool configuration.
    #[serde(default)]
    pub lite_servers: LiteServersConfig,

    /// Block synchronization configuration.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl Default for LiteServersConfig {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            parallelism: default_parallelism(),
            engine_batch: default_engine_batch(),
            on_invalid_key: default_invalid_key_policy(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            server: ServerConfig::default(),
            lite_servers: LiteServersConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Parses the legacy `LITE_SERVERS` format: comma-separated `address:port:key`
/// triples. Base64 keys never contain `:`, so a plain three-way split is safe.
///
/// # Errors
///
/// Returns a descriptive error naming the offending triple when one is not of
/// the `address:port:key` shape or the port is not numeric.
pub fn parse_env_servers(raw: &str) -> Result<Vec<LiteServerEntry>, String> {
    let mut entries = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let mut fields = part.splitn(3, ':');
        let (address, port, key) = match (fields.next(), fields.next(), fields.next()) {
            (Some(a), Some(p), Some(k)) => (a, p, k),
            _ => return Err(format!("expected address:port:key, got {part:?}")),
        };
        let port: u16 =
            port.trim().parse().map_err(|_| format!("invalid port in entry {part:?}"))?;
        entries.push(LiteServerEntry {
            address: address.trim().to_string(),
            port,
            key: key.trim().to_string(),
        });
    }
    Ok(entries)
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `LITEGATE__` prefix override any field,
    /// with `__` as the nesting separator (e.g. `LITEGATE__SERVER__BIND_PORT=8080`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let built = Config::builder()
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("LITEGATE").separator("__"))
            .build()?;

        let mut app: Self = built.try_deserialize()?;
        app.apply_env_servers()?;
        Ok(app)
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The config file path can be overridden with the `LITEGATE_CONFIG`
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("LITEGATE_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Fills the node list from `LITE_SERVERS` when the TOML list is empty.
    fn apply_env_servers(&mut self) -> Result<(), ConfigError> {
        if !self.lite_servers.entries.is_empty() {
            return Ok(());
        }
        if let Ok(raw) = std::env::var("LITE_SERVERS") {
            self.lite_servers.entries = parse_env_servers(&raw)
                .map_err(|e| ConfigError::Message(format!("LITE_SERVERS: {e}")))?;
        }
        Ok(())
    }

    /// Returns the head poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.sync.poll_interval_ms)
    }

    /// Returns the upstream request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.lite_servers.request_timeout_seconds)
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails. An empty
    /// lite-server list is fatal: without it no pool can be built.
    pub fn validate(&self) -> Result<(), String> {
        if self.lite_servers.entries.is_empty() {
            return Err("no lite servers configured (set [[lite_servers.entries]] or LITE_SERVERS)"
                .to_string());
        }
        for entry in &self.lite_servers.entries {
            if entry.address.trim().is_empty() {
                return Err("lite server entry has an empty address".to_string());
            }
            if entry.port == 0 {
                return Err(format!("lite server {} has port 0", entry.address));
            }
        }
        if self.lite_servers.parallelism == 0 {
            return Err("lite_servers.parallelism must be greater than 0".to_string());
        }
        if self.lite_servers.engine_batch == 0 {
            return Err("lite_servers.engine_batch must be greater than 0".to_string());
        }
        if self.lite_servers.request_timeout_seconds == 0 {
            return Err("lite_servers.request_timeout_seconds must be greater than 0".to_string());
        }
        if self.sync.poll_interval_ms == 0 {
            return Err("sync.poll_interval_ms must be greater than 0".to_string());
        }
        if self.sync.subscriber_buffer == 0 {
            return Err("sync.subscriber_buffer must be greater than 0".to_string());
        }
        if self.server.bind_port == 0 {
            return Err("server.bind_port must be greater than 0".to_string());
        }
        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("logging.format must be 'json' or 'pretty'".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entry() -> LiteServerEntry {
        LiteServerEntry {
            address: "1.2.3.4".to_string(),
            port: 4924,
            key: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string(),
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.environment, "development");
        assert_eq!(config.server.bind_port, 3000);
        assert_eq!(config.lite_servers.parallelism, 50);
        assert_eq!(config.lite_servers.engine_batch, 10);
        assert_eq!(config.lite_servers.on_invalid_key, InvalidKeyPolicy::Abort);
        assert_eq!(config.sync.poll_interval_ms, 1000);
    }

    #[test]
    fn test_validation_requires_entries() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err());

        config.lite_servers.entries.push(test_entry());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = AppConfig::default();
        config.lite_servers.entries.push(test_entry());

        config.lite_servers.parallelism = 0;
        assert!(config.validate().is_err());
        config.lite_servers.parallelism = 50;

        config.sync.poll_interval_ms = 0;
        assert!(config.validate().is_err());
        config.sync.poll_interval_ms = 1000;

        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_env_servers() {
        let entries =
            parse_env_servers("1592601963:4924:abc=, lite.example.com:8088:def=").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].address, "1592601963");
        assert_eq!(entries[0].port, 4924);
        assert_eq!(entries[0].key, "abc=");
        assert_eq!(entries[1].address, "lite.example.com");
    }

    #[test]
    fn test_parse_env_servers_rejects_malformed() {
        assert!(parse_env_servers("no-port-or-key").is_err());
        assert!(parse_env_servers("host:notaport:key").is_err());
        // Trailing separators are tolerated.
        assert_eq!(parse_env_servers("1.2.3.4:1:k=, ").unwrap().len(), 1);
        assert!(parse_env_servers("").unwrap().is_empty());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[server]
bind_port = 8080

[lite_servers]
parallelism = 4
on_invalid_key = "skip"

[[lite_servers.entries]]
address = "1592601963"
port = 4924
key = "n4VDnSCUuSpjnCyUk9e3QOOd6o0ItSWYbTnW3Wnn8wk="
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.bind_port, 8080);
        assert_eq!(config.lite_servers.parallelism, 4);
        assert_eq!(config.lite_servers.on_invalid_key, InvalidKeyPolicy::Skip);
        assert_eq!(config.lite_servers.entries[0].port, 4924);
        // Unset sections fall back to defaults.
        assert_eq!(config.sync.subscriber_buffer, 32);
    }

    #[test]
    fn test_partial_logging_section_uses_field_defaults() {
        let toml_content = r#"
[logging]
level = "debug"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }
}
