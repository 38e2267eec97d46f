//! Configuration loading for the realtime client

use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use crate::{Result, RteError};

/// Primary interface port for UR robots
pub const UR_PRIMARY_PORT: u16 = 30001;

/// Largest packet the framer accepts before declaring the stream desynchronized
pub const DEFAULT_MAX_PACKET_LEN: usize = 1 << 20;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub controller: ControllerConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    pub host: String,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConnectionConfig {
    pub retry_delay_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    pub max_packet_len: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitorConfig {
    pub include_internal: Option<bool>,
    #[serde(default)]
    pub ignored_fault_codes: Vec<String>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load_from_path(config_path: &str) -> Result<Self> {
        let contents = fs::read_to_string(config_path)
            .map_err(|e| RteError::Config(format!("Failed to read {}: {}", config_path, e)))?;

        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        if config.controller.host.trim().is_empty() {
            return Err(RteError::Config("controller.host must not be empty".to_string()));
        }
        Ok(config)
    }

    /// Build a configuration with defaults for everything but the host
    pub fn for_host(host: &str) -> Self {
        Self {
            controller: ControllerConfig {
                host: host.to_string(),
                port: None,
            },
            connection: ConnectionConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Get port with the primary interface as fallback
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(UR_PRIMARY_PORT)
    }
}

impl ConnectionConfig {
    /// Initial reconnect delay
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.unwrap_or(5000))
    }

    /// Upper bound for the reconnect delay, never below the initial delay
    pub fn retry_max_delay(&self) -> Duration {
        let max = Duration::from_millis(self.retry_max_delay_ms.unwrap_or(5000));
        max.max(self.retry_delay())
    }

    /// Idle read timeout after which the socket is torn down
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms.unwrap_or(2000))
    }

    pub fn max_packet_len(&self) -> usize {
        self.max_packet_len.unwrap_or(DEFAULT_MAX_PACKET_LEN)
    }
}

impl MonitorConfig {
    /// Whether internal messages (cartesian info, variable tables) are published
    pub fn include_internal(&self) -> bool {
        self.include_internal.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_to_missing_sections() {
        let config = Config::from_yaml("controller:\n  host: 10.0.0.5\n").unwrap();

        assert_eq!(config.controller.host, "10.0.0.5");
        assert_eq!(config.controller.port(), UR_PRIMARY_PORT);
        assert_eq!(config.connection.retry_delay(), Duration::from_millis(5000));
        assert_eq!(config.connection.idle_timeout(), Duration::from_millis(2000));
        assert_eq!(config.connection.max_packet_len(), DEFAULT_MAX_PACKET_LEN);
        assert!(!config.monitor.include_internal());
        assert!(config.monitor.ignored_fault_codes.is_empty());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
controller:
  host: ursim
  port: 30011
connection:
  retry_delay_ms: 100
  retry_max_delay_ms: 2000
  idle_timeout_ms: 500
  max_packet_len: 4096
monitor:
  include_internal: true
  ignored_fault_codes:
    - "210A0"
    - "C1\\d+A.*"
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.controller.port(), 30011);
        assert_eq!(config.connection.retry_delay(), Duration::from_millis(100));
        assert_eq!(config.connection.retry_max_delay(), Duration::from_millis(2000));
        assert_eq!(config.connection.idle_timeout(), Duration::from_millis(500));
        assert_eq!(config.connection.max_packet_len(), 4096);
        assert!(config.monitor.include_internal());
        assert_eq!(config.monitor.ignored_fault_codes.len(), 2);
    }

    #[test]
    fn test_max_delay_never_below_initial_delay() {
        let connection = ConnectionConfig {
            retry_delay_ms: Some(3000),
            retry_max_delay_ms: Some(1000),
            ..Default::default()
        };

        assert_eq!(connection.retry_max_delay(), Duration::from_millis(3000));
    }

    #[test]
    fn test_empty_host_rejected() {
        let result = Config::from_yaml("controller:\n  host: \"\"\n");
        assert!(matches!(result, Err(RteError::Config(_))));
    }
}
