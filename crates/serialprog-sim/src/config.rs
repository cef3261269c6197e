//! Simulator configuration

use serde::{Deserialize, Serialize};
use serialprog_core::{ConfigError, DeviceClass};
use std::path::Path;

/// Complete simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// CAN interface name
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Status broadcast period in milliseconds
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// The simulated device
    #[serde(default)]
    pub device: DeviceConfig,
}

fn default_interface() -> String {
    "vcan0".to_string()
}

fn default_period_ms() -> u64 {
    100
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            period_ms: default_period_ms(),
            device: DeviceConfig::default(),
        }
    }
}

impl SimConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_ms == 0 {
            return Err(ConfigError::Invalid(
                "period_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Initial state and behaviour of a simulated device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device class
    #[serde(default = "default_class")]
    pub class: DeviceClass,

    /// Serial number the device starts with
    #[serde(default)]
    pub serial: u32,

    /// Start with a latched critical fault (battery only)
    #[serde(default)]
    pub critical_fault: bool,

    /// Error codes reported in rotation until the next reset (battery only)
    #[serde(default)]
    pub error_codes: Vec<u8>,

    /// Accept program-serial commands
    #[serde(default = "default_adopt_serial")]
    pub adopt_serial: bool,
}

fn default_class() -> DeviceClass {
    DeviceClass::Battery
}

fn default_adopt_serial() -> bool {
    true
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            class: default_class(),
            serial: 0,
            critical_fault: false,
            error_codes: Vec::new(),
            adopt_serial: default_adopt_serial(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SimConfig::from_toml_str("").unwrap();
        assert_eq!(config.interface, "vcan0");
        assert_eq!(config.period_ms, 100);
        assert_eq!(config.device.class, DeviceClass::Battery);
        assert!(config.device.adopt_serial);
    }

    #[test]
    fn test_load_charger_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
interface = "vcan1"
period_ms = 50

[device]
class = "charger"
serial = 4660
adopt_serial = false
"#
        )
        .unwrap();

        let config = SimConfig::load(file.path()).unwrap();
        assert_eq!(config.interface, "vcan1");
        assert_eq!(config.period_ms, 50);
        assert_eq!(config.device.class, DeviceClass::Charger);
        assert_eq!(config.device.serial, 4660);
        assert!(!config.device.adopt_serial);
    }

    #[test]
    fn test_bundled_battery_config() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/battery-faulted.toml");
        let config = SimConfig::load(path).unwrap();
        assert_eq!(config.device.serial, 66);
        assert!(config.device.critical_fault);
        assert_eq!(config.device.error_codes, vec![0x17, 0x2A]);
    }

    #[test]
    fn test_zero_period_rejected() {
        let err = SimConfig::from_toml_str("period_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "period_ms = 0").unwrap();
        assert!(matches!(
            SimConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SimConfig::load("/nonexistent/serialprog-sim.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
