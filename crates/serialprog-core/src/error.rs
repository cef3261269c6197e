//! Provisioning errors

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::serial::SerialNumber;

/// CAN bus errors
///
/// A receive timeout is not an error: [`crate::CanBus::recv`] reports it as
/// `Ok(None)`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Failed to open bus: {0}")]
    Open(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Bus closed")]
    Closed,

    #[error("Bus not supported: {0}")]
    Unsupported(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(#[from] FrameError),
}

/// Frame construction errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Identifier 0x{0:X} does not fit in 29 bits")]
    IdentifierTooWide(u32),

    #[error("Payload of {0} bytes exceeds 8 bytes")]
    PayloadTooLong(usize),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Reasons a provisioning session ends without success, plus the
/// non-fatal residual error diagnostic
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    /// Discover exhausted its budget without seeing the device class
    #[error("device not found")]
    DeviceNotFound,

    /// Verify never saw the device report the target serial
    #[error("serial programming not confirmed for {0}")]
    ProgrammingUnconfirmed(SerialNumber),

    /// ClearStatus never saw a nominal status byte
    #[error("status-clear not acknowledged")]
    StatusClearRejected,

    /// ResetConfirm's last observation still showed a fault
    ///
    /// Bytes are `None` when no complete status broadcast was seen after reset.
    #[error(
        "device programmed but reporting errors (status {}, error {})",
        describe_byte(.status),
        describe_byte(.error)
    )]
    ResidualErrorPresent {
        status: Option<u8>,
        error: Option<u8>,
    },

    /// The bus failed outright
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

fn describe_byte(byte: &Option<u8>) -> String {
    match byte {
        Some(b) => format!("0x{:02X}", b),
        None => "-".to_string(),
    }
}

impl ProvisioningError {
    /// Short machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            ProvisioningError::DeviceNotFound => "device_not_found",
            ProvisioningError::ProgrammingUnconfirmed(_) => "programming_unconfirmed",
            ProvisioningError::StatusClearRejected => "status_clear_rejected",
            ProvisioningError::ResidualErrorPresent { .. } => "residual_error_present",
            ProvisioningError::Bus(_) => "bus_error",
        }
    }
}

impl Serialize for ProvisioningError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("ProvisioningError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
