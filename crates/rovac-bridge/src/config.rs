//! # Bridge Configuration
//!
//! Configuration management for the vacuum bridge.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ROVAC_EMAIL=me@example.com                                         │
//! │     ROVAC_DEVICE_ID=vac-042                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/rovac/bridge.toml (Linux)                                │
//! │     ~/Library/Application Support/io.rovac.bridge/bridge.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     port 8883, 30s poll, 1800s token lifetime                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # bridge.toml
//! [account]
//! email = "me@example.com"
//! password = "secret"
//!
//! [device]
//! id = "vac-042"
//! name = "Living Room Vacuum"
//!
//! [cloud]
//! base_url = "https://cloud.example.com"
//!
//! [mqtt]
//! host = "iot.cloud.example.com"
//! port = 8883
//! poll_interval_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{BridgeError, BridgeResult};

// =============================================================================
// Account Configuration
// =============================================================================

/// The cloud account the robot is registered under.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account email (OAuth username).
    pub email: String,

    /// Account password.
    pub password: String,
}

// =============================================================================
// Device Configuration
// =============================================================================

/// The robot this bridge talks to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device ID as listed by the cloud. When empty and the account has
    /// exactly one device, the bridge adopts it on startup.
    #[serde(default)]
    pub id: String,

    /// Human-readable device name (for logging).
    #[serde(default)]
    pub name: String,
}

// =============================================================================
// Cloud Configuration
// =============================================================================

/// Cloud REST endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Base URL of the cloud REST API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// OAuth client ID, sent as HTTP Basic auth on token requests.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// OAuth client secret.
    #[serde(default = "default_client_secret")]
    pub client_secret: String,

    /// Request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Seconds before token expiry at which a refresh is triggered.
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: u64,
}

fn default_base_url() -> String {
    "https://cloud.example.com".to_string()
}

fn default_client_id() -> String {
    "blitz_wolf".to_string()
}

fn default_client_secret() -> String {
    "secret".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_refresh_margin() -> u64 {
    60
}

impl Default for CloudConfig {
    fn default() -> Self {
        CloudConfig {
            base_url: default_base_url(),
            client_id: default_client_id(),
            client_secret: default_client_secret(),
            request_timeout_secs: default_request_timeout(),
            refresh_margin_secs: default_refresh_margin(),
        }
    }
}

// =============================================================================
// MQTT Configuration
// =============================================================================

/// MQTT broker and session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker hostname. Empty means "derive from cloud base_url" by
    /// prefixing the host with `iot.`, matching the vendor's layout.
    #[serde(default)]
    pub host: String,

    /// Broker port (TLS).
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Keep-alive interval (seconds).
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Interval between one-shot state polls (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Initial backoff duration (milliseconds) for reconnection.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds) for reconnection.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_mqtt_port() -> u16 {
    8883
}
fn default_keep_alive() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_poll_interval() -> u64 {
    30
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            host: String::new(),
            port: default_mqtt_port(),
            keep_alive_secs: default_keep_alive(),
            connect_timeout_secs: default_connect_timeout(),
            poll_interval_secs: default_poll_interval(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl MqttConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// =============================================================================
// Main Bridge Configuration
// =============================================================================

/// Complete bridge configuration.
///
/// ## Example Config File
/// ```toml
/// [account]
/// email = "me@example.com"
/// password = "secret"
///
/// [device]
/// id = "vac-042"
///
/// [cloud]
/// base_url = "https://cloud.example.com"
///
/// [mqtt]
/// port = 8883
/// poll_interval_secs = 30
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Cloud account credentials.
    #[serde(default)]
    pub account: AccountConfig,

    /// Target device.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Cloud REST settings.
    #[serde(default)]
    pub cloud: CloudConfig,

    /// MQTT session settings.
    #[serde(default)]
    pub mqtt: MqttConfig,
}

impl BridgeConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (bridge.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> BridgeResult<Self> {
        let mut config = Self::default();

        // Try to load from config file
        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading bridge config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        // Override with environment variables
        config.apply_env_overrides();

        // Validate the configuration
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> BridgeResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| BridgeError::ConfigSaveFailed("No config path available".into()))?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Bridge config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.account.email.is_empty() {
            return Err(BridgeError::InvalidConfig(
                "account.email must be set".into(),
            ));
        }
        if self.account.password.is_empty() {
            return Err(BridgeError::InvalidConfig(
                "account.password must be set".into(),
            ));
        }

        if !self.cloud.base_url.starts_with("http://")
            && !self.cloud.base_url.starts_with("https://")
        {
            return Err(BridgeError::InvalidConfig(format!(
                "cloud.base_url must start with http:// or https://, got: {}",
                self.cloud.base_url
            )));
        }

        if self.mqtt.poll_interval_secs == 0 {
            return Err(BridgeError::InvalidConfig(
                "mqtt.poll_interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(email) = std::env::var("ROVAC_EMAIL") {
            debug!("Overriding account email from environment");
            self.account.email = email;
        }

        if let Ok(password) = std::env::var("ROVAC_PASSWORD") {
            self.account.password = password;
        }

        if let Ok(id) = std::env::var("ROVAC_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(url) = std::env::var("ROVAC_CLOUD_URL") {
            debug!(url = %url, "Overriding cloud URL from environment");
            self.cloud.base_url = url;
        }

        if let Ok(host) = std::env::var("ROVAC_MQTT_HOST") {
            self.mqtt.host = host;
        }

        if let Ok(port) = std::env::var("ROVAC_MQTT_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                debug!(port = p, "Overriding MQTT port from environment");
                self.mqtt.port = p;
            }
        }

        if let Ok(interval) = std::env::var("ROVAC_POLL_INTERVAL") {
            if let Ok(secs) = interval.parse::<u64>() {
                self.mqtt.poll_interval_secs = secs;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "rovac", "bridge").map(|dirs| {
            let config_dir = dirs.config_dir();
            config_dir.join("bridge.toml")
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the MQTT broker host, deriving it from the cloud base URL
    /// when not set explicitly (the vendor serves MQTT on `iot.<cloud-host>`).
    pub fn mqtt_host(&self) -> BridgeResult<String> {
        if !self.mqtt.host.is_empty() {
            return Ok(self.mqtt.host.clone());
        }

        let host = self
            .cloud
            .base_url
            .strip_prefix("https://")
            .or_else(|| self.cloud.base_url.strip_prefix("http://"))
            .map(|rest| rest.trim_end_matches('/'))
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                BridgeError::InvalidConfig(format!(
                    "Cannot derive MQTT host from cloud URL: {}",
                    self.cloud.base_url
                ))
            })?;

        Ok(format!("iot.{}", host))
    }

    /// Returns the device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> BridgeConfig {
        BridgeConfig {
            account: AccountConfig {
                email: "me@example.com".into(),
                password: "secret".into(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.poll_interval_secs, 30);
        assert_eq!(config.cloud.refresh_margin_secs, 60);
        assert_eq!(config.cloud.client_id, "blitz_wolf");
    }

    #[test]
    fn test_config_validation() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());

        // Missing credentials should fail
        config.account.email = String::new();
        assert!(config.validate().is_err());

        // Invalid cloud URL should fail
        config.account.email = "me@example.com".into();
        config.cloud.base_url = "ftp://cloud".into();
        assert!(config.validate().is_err());

        // Zero poll interval should fail
        config.cloud.base_url = "https://cloud.example.com".into();
        config.mqtt.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mqtt_host_derivation() {
        let mut config = valid_config();
        config.cloud.base_url = "https://cloud.example.com".into();
        assert_eq!(config.mqtt_host().unwrap(), "iot.cloud.example.com");

        // Explicit host wins
        config.mqtt.host = "broker.other.net".into();
        assert_eq!(config.mqtt_host().unwrap(), "broker.other.net");
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("ROVAC_MQTT_PORT", "1883");
        std::env::set_var("ROVAC_DEVICE_ID", "vac-env");

        let mut config = valid_config();
        config.apply_env_overrides();
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.device.id, "vac-env");

        std::env::remove_var("ROVAC_MQTT_PORT");
        std::env::remove_var("ROVAC_DEVICE_ID");
    }

    #[test]
    fn test_toml_serialization() {
        let config = valid_config();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[account]"));
        assert!(toml_str.contains("[mqtt]"));

        let parsed: BridgeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.account.email, "me@example.com");
        assert_eq!(parsed.mqtt.port, 8883);
    }
}
