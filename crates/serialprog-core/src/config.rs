//! Provisioner configuration
//!
//! Bus selection, per-call receive timeout and per-phase poll budgets.
//! Every field has a default, so an empty TOML document is a valid config.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level provisioner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Bus configuration
    #[serde(default)]
    pub bus: BusConfig,
    /// Timeout of a single blocking receive
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    /// Poll budgets per phase
    #[serde(default)]
    pub budgets: PhaseBudgets,
}

fn default_receive_timeout_ms() -> u64 {
    1000
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            receive_timeout_ms: default_receive_timeout_ms(),
            budgets: PhaseBudgets::default(),
        }
    }
}

impl ProvisionerConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

// =============================================================================
// Bus Configuration
// =============================================================================

/// Bus configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BusConfig {
    /// Raw SocketCAN (Linux only)
    SocketCan(SocketCanConfig),
    /// In-memory bus for testing
    Mock,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::SocketCan(SocketCanConfig::default())
    }
}

/// SocketCAN configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketCanConfig {
    /// CAN interface name (e.g., "can0")
    #[serde(default = "default_interface")]
    pub interface: String,
    /// Expected bus bitrate; the interface itself is configured by the OS
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
}

fn default_interface() -> String {
    "can0".to_string()
}

fn default_bitrate() -> u32 {
    500000
}

impl Default for SocketCanConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            bitrate: default_bitrate(),
        }
    }
}

// =============================================================================
// Poll Budgets
// =============================================================================

/// Frame-count and deadline pair bounding one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollBudget {
    /// Maximum number of received frames to examine
    pub max_frames: usize,
    /// Wall-clock limit in milliseconds
    pub deadline_ms: u64,
}

impl PollBudget {
    pub const fn new(max_frames: usize, deadline_ms: u64) -> Self {
        Self {
            max_frames,
            deadline_ms,
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// Budgets for each polling phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseBudgets {
    #[serde(default = "default_discover")]
    pub discover: PollBudget,
    #[serde(default = "default_verify")]
    pub verify: PollBudget,
    #[serde(default = "default_clear_status")]
    pub clear_status: PollBudget,
    #[serde(default = "default_reset_confirm")]
    pub reset_confirm: PollBudget,
}

fn default_discover() -> PollBudget {
    PollBudget::new(100, 10_000)
}

fn default_verify() -> PollBudget {
    PollBudget::new(1000, 10_000)
}

fn default_clear_status() -> PollBudget {
    PollBudget::new(1000, 10_000)
}

fn default_reset_confirm() -> PollBudget {
    PollBudget::new(40, 10_000)
}

impl Default for PhaseBudgets {
    fn default() -> Self {
        Self {
            discover: default_discover(),
            verify: default_verify(),
            clear_status: default_clear_status(),
            reset_confirm: default_reset_confirm(),
        }
    }
}

impl PhaseBudgets {
    /// Same budgets with every deadline replaced by `deadline_ms`
    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.discover.deadline_ms = deadline_ms;
        self.verify.deadline_ms = deadline_ms;
        self.clear_status.deadline_ms = deadline_ms;
        self.reset_confirm.deadline_ms = deadline_ms;
        self
    }
}
