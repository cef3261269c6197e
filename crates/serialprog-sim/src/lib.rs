//! serialprog-sim - Battery and charger simulator
//!
//! Provides components for simulating provisionable devices:
//!
//! - [`device`] - A battery or charger that broadcasts status and reacts to
//!   provisioning commands
//! - [`bus`] - An in-process [`serialprog_core::CanBus`] wired to one
//!   simulated device
//! - [`config`] - Simulator configuration

pub mod bus;
pub mod config;
pub mod device;

pub use bus::SimBus;
pub use config::{DeviceConfig, SimConfig};
pub use device::SimulatedDevice;
