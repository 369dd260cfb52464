//! Configuration for the base driver
//!
//! Loads configuration from a TOML file with the parameters needed to talk to
//! the base controller: serial device, velocity limits, wheel geometry and
//! link tuning. The embedding process owns where the file lives and when it
//! is loaded.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Operating mode for the connection sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Wait for a valid packet to confirm link health before reporting connected
    Full,
    /// Skip the connection-confirmation handshake
    Simple,
}

/// Top-level driver configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverConfig {
    pub serial: SerialConfig,
    pub velocity: VelocityConfig,
    pub wheel: WheelConfig,
    pub link: LinkConfig,
}

/// Serial device configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Device path (e.g., "/dev/ttyUSB0")
    pub device: String,
    /// Baud rate (e.g., 115200)
    pub baud: u32,
}

/// Velocity limits and teleop step sizes
///
/// The driver clamps `set_command` against the maxima; the step sizes are
/// consumed by teleop front ends and are carried here so one file configures
/// both sides.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VelocityConfig {
    /// Maximum linear velocity (m/s)
    pub max_linear: f64,
    /// Maximum angular velocity (rad/s)
    pub max_angular: f64,
    /// Linear velocity increment per teleop keypress (m/s)
    pub step_linear: f64,
    /// Angular velocity increment per teleop keypress (rad/s)
    pub step_angular: f64,
}

/// Wheel geometry and encoder calibration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WheelConfig {
    /// Wheel-to-wheel distance (m)
    pub bias: f64,
    /// Millimetres of travel per encoder tick
    pub tick_to_mm: f64,
    /// Wheel rotation in radians per encoder tick
    pub tick_to_rad: f64,
}

/// Connection and handshake tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    /// Operating mode ("full" waits for the handshake, "simple" does not)
    pub mode: OperatingMode,
    /// Open attempts before giving up
    pub connect_attempts: u32,
    /// Delay between open attempts (ms)
    pub connect_backoff_ms: u64,
    /// How long to wait for the first valid packet in full mode (ms)
    pub handshake_timeout_ms: u64,
}

impl LinkConfig {
    /// Backoff between open attempts
    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }

    /// Handshake window
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl DriverConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: DriverConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Default configuration for the stock base
    ///
    /// Calibration constants come from the factory firmware. Suitable for
    /// testing and development; deployments should load a TOML file.
    pub fn base_defaults() -> Self {
        Self {
            serial: SerialConfig {
                device: "/dev/ttyUSB0".to_string(),
                baud: 115_200,
            },
            velocity: VelocityConfig {
                max_linear: 0.5,
                max_angular: 2.0,
                step_linear: 0.05,
                step_angular: 0.33,
            },
            wheel: WheelConfig {
                bias: 0.23,
                tick_to_mm: 0.084_581_340_657_7,
                tick_to_rad: 0.002_013_841_444_608_84,
            },
            link: LinkConfig {
                mode: OperatingMode::Full,
                connect_attempts: 5,
                connect_backoff_ms: 200,
                handshake_timeout_ms: 3000,
            },
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::base_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DriverConfig::base_defaults();
        assert_eq!(config.serial.device, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud, 115_200);
        assert_eq!(config.link.mode, OperatingMode::Full);
        assert!(config.velocity.max_linear > 0.0);
        assert!(config.wheel.bias > 0.0);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = DriverConfig::base_defaults();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[serial]"));
        assert!(toml_string.contains("[velocity]"));
        assert!(toml_string.contains("[wheel]"));
        assert!(toml_string.contains("[link]"));
        assert!(toml_string.contains("mode = \"full\""));

        let parsed: DriverConfig = toml::from_str(&toml_string).unwrap();
        assert_eq!(parsed.serial.device, config.serial.device);
        assert_eq!(parsed.link.connect_attempts, config.link.connect_attempts);
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[serial]
device = "/dev/ttyACM0"
baud = 57600

[velocity]
max_linear = 0.3
max_angular = 1.5
step_linear = 0.02
step_angular = 0.2

[wheel]
bias = 0.25
tick_to_mm = 0.0846
tick_to_rad = 0.0020

[link]
mode = "simple"
connect_attempts = 3
connect_backoff_ms = 100
handshake_timeout_ms = 1000
"#;

        let config: DriverConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.serial.device, "/dev/ttyACM0");
        assert_eq!(config.serial.baud, 57_600);
        assert_eq!(config.link.mode, OperatingMode::Simple);
        assert_eq!(config.link.handshake_timeout(), Duration::from_secs(1));
    }
}
