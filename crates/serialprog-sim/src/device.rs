//! Simulated battery and charger
//!
//! A [`SimulatedDevice`] holds the state a real device exposes on the bus:
//! its current serial number, a latched critical fault and a set of pending
//! error codes. It turns that state into status broadcasts and applies the
//! provisioning commands it receives.

use serialprog_core::profile::{ERROR_NONE, STATUS_NOMINAL};
use serialprog_core::{CanFrame, Command, DeviceClass, DeviceProfile, FrameError, SerialNumber};
use tracing::{debug, info};

use crate::config::DeviceConfig;

/// Status byte while a critical fault is latched
const STATUS_CRITICAL: u8 = 0x00;

/// One simulated device
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    profile: &'static DeviceProfile,
    serial: SerialNumber,
    critical_fault: bool,
    error_codes: Vec<u8>,
    next_error: usize,
    adopt_serial: bool,
}

impl SimulatedDevice {
    /// A fault-free device of `class` using `serial`
    pub fn new(class: DeviceClass, serial: SerialNumber) -> Self {
        Self {
            profile: class.profile(),
            serial,
            critical_fault: false,
            error_codes: Vec::new(),
            next_error: 0,
            adopt_serial: true,
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.class, SerialNumber::new(config.serial))
            .with_critical_fault(config.critical_fault)
            .with_error_codes(config.error_codes.clone())
            .adopting_serial(config.adopt_serial)
    }

    pub fn with_critical_fault(mut self, latched: bool) -> Self {
        self.critical_fault = latched;
        self
    }

    pub fn with_error_codes(mut self, codes: Vec<u8>) -> Self {
        self.error_codes = codes;
        self.next_error = 0;
        self
    }

    /// Whether program-serial commands take effect
    pub fn adopting_serial(mut self, adopt: bool) -> Self {
        self.adopt_serial = adopt;
        self
    }

    pub fn class(&self) -> DeviceClass {
        self.profile.class
    }

    pub fn serial(&self) -> SerialNumber {
        self.serial
    }

    pub fn critical_fault(&self) -> bool {
        self.critical_fault
    }

    pub fn error_codes(&self) -> &[u8] {
        &self.error_codes
    }

    /// Apply a command frame; returns the command that took effect
    ///
    /// Program-serial is accepted whatever serial the frame carries. Clear
    /// and reset only apply when the frame's id fields match this device's
    /// current serial.
    pub fn handle_frame(&mut self, frame: &CanFrame) -> Option<Command> {
        let (command, serial) = self.profile.decode_command(frame)?;

        match command {
            Command::ProgramSerial => {
                if !self.adopt_serial {
                    debug!(requested = %serial, "Ignoring program command");
                    return None;
                }
                info!(old = %self.serial, new = %serial, "Serial number programmed");
                self.serial = serial;
            }
            Command::ClearCriticalStatus | Command::Reset if serial != self.serial => {
                debug!(
                    command = ?command,
                    addressed = %serial,
                    own = %self.serial,
                    "Ignoring command for another device"
                );
                return None;
            }
            Command::ClearCriticalStatus => {
                info!(serial = %self.serial, "Critical status cleared");
                self.critical_fault = false;
            }
            Command::Reset => {
                info!(serial = %self.serial, "Device reset");
                self.error_codes.clear();
                self.next_error = 0;
            }
        }
        Some(command)
    }

    /// Next status broadcast, as seen by a listener on the bus
    ///
    /// Each call reports the next pending error code in rotation.
    pub fn status_frame(&mut self) -> Result<CanFrame, FrameError> {
        let mut data = [0u8; 8];
        if let Some(index) = self.profile.status_byte_index {
            data[index] = if self.critical_fault {
                STATUS_CRITICAL
            } else {
                STATUS_NOMINAL
            };
        }
        if let Some(index) = self.profile.error_byte_index {
            data[index] = self.next_error_code();
        }
        CanFrame::inbound(self.profile.status_id(self.serial), &data)
    }

    fn next_error_code(&mut self) -> u8 {
        if self.error_codes.is_empty() {
            return ERROR_NONE;
        }
        let code = self.error_codes[self.next_error % self.error_codes.len()];
        self.next_error = (self.next_error + 1) % self.error_codes.len();
        code
    }
}
