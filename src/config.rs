//! Configuration for cellbot-io
//!
//! Loads configuration from a TOML file. Every section is optional; missing
//! keys fall back to the values in [`Config::default`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub transport: TransportConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

/// Which backend to activate and which robot to connect it to
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Registry label (e.g. "iRobot Create")
    pub label: String,
    /// Bluetooth name of the robot, used when the address is missing or malformed
    pub device_name: String,
    /// Bluetooth address of the robot (`XX:XX:XX:XX:XX:XX`), may be empty
    pub device_address: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            label: "Default".to_string(),
            device_name: String::new(),
            device_address: String::new(),
        }
    }
}

/// Serial transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Baud rate for serial-backed links
    pub baud_rate: u32,
    /// Retry on legacy RFCOMM channels 1..=10 after the service-record attempt fails
    pub channel_fallback: bool,
    /// Delay between a successful open and the backend reporting SUCCESS
    pub settle_ms: u64,
    /// Link read timeout; bounds how long a reader thread takes to notice a stop request
    pub read_timeout_ms: u64,
    /// Devices already paired with this host
    pub paired: Vec<PairedDeviceConfig>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            channel_fallback: true,
            settle_ms: 1000,
            read_timeout_ms: 50,
            paired: Vec::new(),
        }
    }
}

/// One paired device and the serial port its RFCOMM link is bound to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PairedDeviceConfig {
    pub name: String,
    pub address: String,
    pub port: String,
}

/// Create-OI telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Drop sensor frames with a bad checksum and resynchronize
    pub validate_checksum: bool,
    /// Upper bound on waiting for the reader thread during disconnect
    pub join_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            validate_checksum: true,
            join_timeout_ms: 5000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall the reader or disconnect paths
    pub fn validate(&self) -> Result<()> {
        if self.controller.label.trim().is_empty() {
            return Err(Error::Config("controller.label must not be empty".to_string()));
        }
        if self.transport.read_timeout_ms == 0 {
            return Err(Error::Config(
                "transport.read_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.telemetry.join_timeout_ms == 0 {
            return Err(Error::Config(
                "telemetry.join_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.controller.label, "Default");
        assert_eq!(config.transport.baud_rate, 115200);
        assert_eq!(config.transport.settle_ms, 1000);
        assert!(config.transport.channel_fallback);
        assert!(config.telemetry.validate_checksum);
        assert_eq!(config.telemetry.join_timeout_ms, 5000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[controller]
label = "iRobot Create"
device_name = "FireFly-AB12"
device_address = "00:06:66:01:02:03"

[transport]
baud_rate = 57600
channel_fallback = false

[[transport.paired]]
name = "FireFly-AB12"
address = "00:06:66:01:02:03"
port = "/dev/rfcomm0"

[telemetry]
validate_checksum = false
"#;

        let config = Config::parse(toml_content).unwrap();
        assert_eq!(config.controller.label, "iRobot Create");
        assert_eq!(config.controller.device_name, "FireFly-AB12");
        assert_eq!(config.transport.baud_rate, 57600);
        assert!(!config.transport.channel_fallback);
        // Unspecified keys keep their defaults
        assert_eq!(config.transport.settle_ms, 1000);
        assert_eq!(config.transport.paired.len(), 1);
        assert_eq!(config.transport.paired[0].port, "/dev/rfcomm0");
        assert!(!config.telemetry.validate_checksum);
        assert_eq!(config.telemetry.join_timeout_ms, 5000);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.controller.label, "Default");
        assert!(config.transport.paired.is_empty());
    }

    #[test]
    fn test_sample_config_parses() {
        let config = Config::parse(include_str!("../cellbot-io.toml")).unwrap();
        assert_eq!(config.controller.label, "iRobot Create");
        assert_eq!(config.transport.paired.len(), 2);
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let result = Config::parse("[transport]\nread_timeout_ms = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
        let result = Config::parse("[controller]\nlabel = \"\"\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_toml_serialization() {
        let toml_string = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(toml_string.contains("[controller]"));
        assert!(toml_string.contains("[transport]"));
        assert!(toml_string.contains("[telemetry]"));
        assert!(toml_string.contains("settle_ms = 1000"));
    }
}
