//! Configuration system for the sensor monitor
//!
//! Loads the `[mqtt]`, `[history]` and `[status]` sections from TOML and
//! provides the broker settings validator that gates every session start.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Environment variable that overrides `mqtt.broker_url`
pub const BROKER_URL_ENV: &str = "MQTT_BROKER_URL";
/// Environment variable that overrides `mqtt.topic`
pub const TOPIC_ENV: &str = "MQTT_TOPIC";

/// Main monitor configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonitorConfig {
    #[serde(default)]
    pub mqtt: MqttSection,
    /// REST endpoint serving persisted readings (optional)
    pub history: Option<HistorySection>,
    /// HTTP status endpoints (optional)
    pub status: Option<StatusSection>,
}

/// MQTT section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// MQTT broker URL with protocol and port
    #[serde(default)]
    pub broker_url: String,
    /// Topic carrying the live sensor readings
    #[serde(default)]
    pub topic: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Fixed delay between reconnection attempts
    #[serde(default = "default_reconnect_period_ms")]
    pub reconnect_period_ms: u64,
    /// Upper bound for a single connection attempt to receive a CONNACK
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_client_id_prefix")]
    pub client_id_prefix: String,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            broker_url: String::new(),
            topic: String::new(),
            username_env: None,
            password_env: None,
            keep_alive_secs: default_keep_alive_secs(),
            reconnect_period_ms: default_reconnect_period_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            client_id_prefix: default_client_id_prefix(),
        }
    }
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_reconnect_period_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_client_id_prefix() -> String {
    "sensor-monitor".to_string()
}

/// History section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistorySection {
    /// Full URL of the persisted readings endpoint
    pub url: String,
    #[serde(default = "default_history_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_history_timeout_ms() -> u64 {
    10_000
}

/// Status endpoint section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusSection {
    pub port: u16,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("missing broker URL or topic")]
    MissingBrokerSettings,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Check that a broker endpoint and a topic are both present.
///
/// Whitespace-only values count as missing.
pub fn validate_broker_settings(broker_url: &str, topic: &str) -> Result<(), ConfigError> {
    if broker_url.trim().is_empty() || topic.trim().is_empty() {
        return Err(ConfigError::MissingBrokerSettings);
    }
    Ok(())
}

impl MonitorConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MonitorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace broker URL and topic with `MQTT_BROKER_URL` / `MQTT_TOPIC` when set
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = Self::non_empty_env(BROKER_URL_ENV) {
            self.mqtt.broker_url = url;
        }
        if let Some(topic) = Self::non_empty_env(TOPIC_ENV) {
            self.mqtt.topic = topic;
        }
    }

    fn non_empty_env(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.trim().is_empty())
    }

    /// Structural validation; broker URL and topic are checked at session start instead
    fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.reconnect_period_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.reconnect_period_ms must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.mqtt.client_id_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mqtt.client_id_prefix must not be empty".to_string(),
            ));
        }
        if let Some(history) = &self.history {
            if history.url.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "history.url must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl MqttSection {
    /// Resolve username/password from the configured environment variables
    pub fn credentials_from_env(&self) -> Option<(String, String)> {
        let username = self
            .username_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())?;
        let password = self
            .password_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .unwrap_or_default();
        Some((username, password))
    }
}
