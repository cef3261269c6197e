//! Configuration file handling for serialprog

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serialprog_core::config::{BusConfig, SocketCanConfig};
use serialprog_core::ProvisionerConfig;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::output::OutputFormat;

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default output format
    pub output: Option<OutputFormat>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Bus, timeout and budget settings
    #[serde(default)]
    pub provisioner: ProvisionerConfig,
}

impl Config {
    /// Load the default config file, falling back to defaults with a
    /// warning when it cannot be read or parsed
    pub fn load_or_default() -> Self {
        match Self::config_path() {
            Ok(path) => Self::load_or_default_from(&path),
            Err(e) => {
                warn!(error = %e, "No config directory, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_or_default_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring config file, using defaults: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("serialprog");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        interface: Option<&str>,
        output: Option<OutputFormat>,
        no_color: bool,
    ) -> MergedConfig {
        let mut provisioner = self.provisioner.clone();
        if let Some(interface) = interface {
            match &mut provisioner.bus {
                BusConfig::SocketCan(cfg) => cfg.interface = interface.to_string(),
                BusConfig::Mock => {
                    provisioner.bus = BusConfig::SocketCan(SocketCanConfig {
                        interface: interface.to_string(),
                        ..Default::default()
                    })
                }
            }
        }

        MergedConfig {
            provisioner,
            output: output.or(self.output).unwrap_or_default(),
            no_color: no_color || self.no_color.unwrap_or(false),
        }
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub provisioner: ProvisionerConfig,
    pub output: OutputFormat,
    pub no_color: bool,
}
