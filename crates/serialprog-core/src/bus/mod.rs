//! CAN bus access
//!
//! This module provides the bus adapters the provisioning session talks to:
//! - SocketCAN adapter on a raw CAN socket (Linux only)
//! - Mock adapter for testing
//!
//! # Example
//!
//! ```ignore
//! use serialprog_core::bus::{create_bus, CanBus};
//! use serialprog_core::config::BusConfig;
//!
//! let mut bus = create_bus(&BusConfig::Mock)?;
//! let frame = bus.recv(Duration::from_secs(1))?;
//! ```

pub mod mock;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use mock::MockBus;

use std::time::Duration;

use crate::config::BusConfig;
use crate::error::BusError;
use crate::frame::CanFrame;

/// Exclusive handle to one CAN bus
///
/// A session owns the bus through `&mut` for its whole run, so adapters need
/// no internal locking.
pub trait CanBus: Send {
    /// Transmit one frame
    fn send(&mut self, frame: &CanFrame) -> Result<(), BusError>;

    /// Receive one frame, waiting at most `timeout`
    ///
    /// `Ok(None)` means nothing arrived in time; that is a normal outcome.
    fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>, BusError>;

    /// Name of the underlying interface
    fn interface(&self) -> &str;
}

impl<B: CanBus + ?Sized> CanBus for Box<B> {
    fn send(&mut self, frame: &CanFrame) -> Result<(), BusError> {
        (**self).send(frame)
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>, BusError> {
        (**self).recv(timeout)
    }

    fn interface(&self) -> &str {
        (**self).interface()
    }
}

/// Open a bus adapter based on configuration
pub fn create_bus(config: &BusConfig) -> Result<Box<dyn CanBus>, BusError> {
    match config {
        #[cfg(all(target_os = "linux", feature = "socketcan"))]
        BusConfig::SocketCan(cfg) => {
            let bus = self::socketcan::SocketCanBus::open(cfg)?;
            Ok(Box::new(bus))
        }
        #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
        BusConfig::SocketCan(_) => Err(BusError::Unsupported(
            "SocketCAN requires Linux and the 'socketcan' feature".to_string(),
        )),
        BusConfig::Mock => Ok(Box::new(MockBus::new())),
    }
}
