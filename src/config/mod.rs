//! # Configuration Management Module
//!
//! Settings for the radio link, the chat view and logging, stored as TOML.
//!
//! ## Configuration Structure
//!
//! - [`MeshtasticConfig`] - transport selection and radio tuning
//! - [`ChatConfig`] - scrollback size and timestamp format
//! - [`LoggingConfig`] - log level and log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshchat::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Missing files fall back to defaults
//!     let config = Config::load_or_default("meshchat.toml").await?;
//!     println!("Radio link: {}", config.meshtastic.link_spec()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [meshtastic]
//! transport = "serial"        # or "tcp"
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//! host = "192.168.1.20"       # used when transport = "tcp"
//! tcp_port = 4403
//! channel = 0
//!
//! [chat]
//! history_lines = 1000
//! timestamp_format = "%H:%M:%S"
//!
//! [logging]
//! level = "info"
//! file = "meshchat.log"
//! ```
//!
//! Precedence: CLI args > config file > defaults.

use crate::meshtastic::link::{LinkSpec, DEFAULT_TCP_PORT};
use anyhow::{anyhow, Result};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

/// Meshtastic firmware supports channel indexes 0..=7.
pub const MAX_CHANNEL_INDEX: u32 = 7;
/// Firmware rejects hop limits above 7.
pub const MAX_HOP_LIMIT: u32 = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("baud_rate must be greater than zero")]
    ZeroBaud,
    #[error("serial transport selected but no serial port configured")]
    MissingPort,
    #[error("tcp transport selected but no host configured")]
    MissingHost,
    #[error("channel {0} is out of range (0-7)")]
    ChannelOutOfRange(u32),
    #[error("hop_limit {0} is out of range (0-7)")]
    HopLimitOutOfRange(u32),
    #[error("history_lines must be at least 1")]
    EmptyHistory,
    #[error("timestamp_format '{0}' is not a valid strftime format")]
    BadTimestampFormat(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Serial,
    Tcp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshtasticConfig {
    #[serde(default)]
    pub transport: Transport,
    /// Serial device path (e.g. /dev/ttyUSB0, COM3)
    #[serde(default)]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Hostname or IP of a network-attached node
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    /// Channel index used for sending and for filtering received text
    #[serde(default)]
    pub channel: u32,
    #[serde(default = "default_hop_limit")]
    pub hop_limit: u32,
    /// Minimum gap between consecutive text sends (ms)
    #[serde(default = "default_min_send_gap_ms")]
    pub min_send_gap_ms: u64,
    /// Heartbeat interval keeping the API session alive (seconds, 0 disables)
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// How long to wait for the radio to finish sending its node list (seconds)
    #[serde(default = "default_config_timeout_secs")]
    pub config_timeout_secs: u64,
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}

fn default_hop_limit() -> u32 {
    3
}

fn default_min_send_gap_ms() -> u64 {
    1000
}

fn default_heartbeat_secs() -> u64 {
    300
}

fn default_config_timeout_secs() -> u64 {
    30
}

impl Default for MeshtasticConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Serial,
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: default_baud_rate(),
            host: String::new(),
            tcp_port: default_tcp_port(),
            channel: 0,
            hop_limit: default_hop_limit(),
            min_send_gap_ms: default_min_send_gap_ms(),
            heartbeat_secs: default_heartbeat_secs(),
            config_timeout_secs: default_config_timeout_secs(),
        }
    }
}

impl MeshtasticConfig {
    /// Transport description for [`crate::meshtastic::link::open_link`].
    pub fn link_spec(&self) -> Result<LinkSpec, ConfigError> {
        match self.transport {
            Transport::Serial => {
                if self.port.trim().is_empty() {
                    return Err(ConfigError::MissingPort);
                }
                if self.baud_rate == 0 {
                    return Err(ConfigError::ZeroBaud);
                }
                Ok(LinkSpec::Serial {
                    port: self.port.trim().to_string(),
                    baud_rate: self.baud_rate,
                })
            }
            Transport::Tcp => {
                if self.host.trim().is_empty() {
                    return Err(ConfigError::MissingHost);
                }
                Ok(LinkSpec::Tcp {
                    host: self.host.trim().to_string(),
                    port: self.tcp_port,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Scrollback kept in memory
    #[serde(default = "default_history_lines")]
    pub history_lines: usize,
    /// chrono format string for message timestamps
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn default_history_lines() -> usize {
    1000
}

fn default_timestamp_format() -> String {
    "%H:%M:%S".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_lines: default_history_lines(),
            timestamp_format: default_timestamp_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Omitting this in an explicit `[logging]` section disables the log file
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: Some("meshchat.log".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub meshtastic: MeshtasticConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Command line overrides applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub serial: Option<String>,
    pub host: Option<String>,
    pub channel: Option<u32>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise start from defaults.
    pub async fn load_or_default(path: &str) -> Result<Self> {
        match fs::try_exists(path).await {
            Ok(true) => Self::load(path).await,
            _ => Ok(Self::default()),
        }
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// `--serial` and `--host` also switch the transport.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(port) = &overrides.serial {
            self.meshtastic.transport = Transport::Serial;
            self.meshtastic.port = port.clone();
        }
        if let Some(host) = &overrides.host {
            self.meshtastic.transport = Transport::Tcp;
            self.meshtastic.host = host.clone();
        }
        if let Some(channel) = overrides.channel {
            self.meshtastic.channel = channel;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.meshtastic.link_spec()?;
        if self.meshtastic.channel > MAX_CHANNEL_INDEX {
            return Err(ConfigError::ChannelOutOfRange(self.meshtastic.channel));
        }
        if self.meshtastic.hop_limit > MAX_HOP_LIMIT {
            return Err(ConfigError::HopLimitOutOfRange(self.meshtastic.hop_limit));
        }
        if self.chat.history_lines == 0 {
            return Err(ConfigError::EmptyHistory);
        }
        let format = &self.chat.timestamp_format;
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::BadTimestampFormat(format.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.meshtastic.transport, Transport::Serial);
        assert_eq!(config.meshtastic.tcp_port, 4403);
        assert_eq!(config.chat.timestamp_format, "%H:%M:%S");
    }

    #[test]
    fn partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [meshtastic]
            transport = "tcp"
            host = "192.168.1.20"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.meshtastic.link_spec(),
            Ok(LinkSpec::Tcp {
                host: "192.168.1.20".into(),
                port: 4403
            })
        );
        assert_eq!(config.meshtastic.channel, 0);
        assert_eq!(config.chat.history_lines, 1000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn overrides_switch_transport() {
        let mut config = Config::default();
        config.apply_overrides(&Overrides {
            host: Some("meshnode.local".into()),
            channel: Some(2),
            ..Default::default()
        });
        assert_eq!(config.meshtastic.transport, Transport::Tcp);
        assert_eq!(config.meshtastic.channel, 2);

        config.apply_overrides(&Overrides {
            serial: Some("COM3".into()),
            ..Default::default()
        });
        assert_eq!(
            config.meshtastic.link_spec(),
            Ok(LinkSpec::Serial {
                port: "COM3".into(),
                baud_rate: 115200
            })
        );
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = Config::default();
        config.meshtastic.channel = 8;
        assert_eq!(config.validate(), Err(ConfigError::ChannelOutOfRange(8)));

        let mut config = Config::default();
        config.meshtastic.transport = Transport::Tcp;
        assert_eq!(config.validate(), Err(ConfigError::MissingHost));

        let mut config = Config::default();
        config.meshtastic.baud_rate = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroBaud));

        let mut config = Config::default();
        config.chat.history_lines = 0;
        assert_eq!(config.validate(), Err(ConfigError::EmptyHistory));

        let mut config = Config::default();
        config.meshtastic.hop_limit = 9;
        assert_eq!(config.validate(), Err(ConfigError::HopLimitOutOfRange(9)));
    }

    #[test]
    fn default_config_serializes_to_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(text.contains("[meshtastic]"));
        assert!(text.contains("transport = \"serial\""));
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.meshtastic.port, "/dev/ttyUSB0");
    }
}
