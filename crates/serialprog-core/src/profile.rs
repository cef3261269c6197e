//! Device class profiles
//!
//! Each device class broadcasts status frames whose identifier carries an
//! 11-bit class prefix above bit 18 and the device's serial number in the low
//! 20 bits. Command identifiers are built from a command prefix with the same
//! shift, so one shift/mask pair describes both directions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::frame::CanFrame;
use crate::serial::SerialNumber;
use crate::session::Phase;

/// Identifier shift that exposes the class prefix
pub const DISCOVERY_SHIFT: u32 = 18;

/// Width of the class prefix after shifting
pub const DISCOVERY_MASK: u32 = 0x7FF;

/// Battery status byte value meaning "no active critical fault"
pub const STATUS_NOMINAL: u8 = 0x80;

/// Battery error byte value meaning "no error"
pub const ERROR_NONE: u8 = 0x00;

/// Supported device classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Battery,
    Charger,
}

impl DeviceClass {
    /// All classes, in scan order
    pub const ALL: [DeviceClass; 2] = [DeviceClass::Battery, DeviceClass::Charger];

    /// The constant profile for this class
    pub fn profile(self) -> &'static DeviceProfile {
        match self {
            DeviceClass::Battery => &BATTERY,
            DeviceClass::Charger => &CHARGER,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Battery => write!(f, "battery"),
            DeviceClass::Charger => write!(f, "charger"),
        }
    }
}

impl FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "battery" => Ok(DeviceClass::Battery),
            "charger" => Ok(DeviceClass::Charger),
            other => Err(format!("unknown device class '{}'", other)),
        }
    }
}

/// Commands the provisioning protocol can send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Program a new serial number
    ProgramSerial,
    /// Clear a latched critical status
    ClearCriticalStatus,
    /// Reset the device
    Reset,
}

/// Payload encoding of a command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLayout {
    /// `[op, id2, id1, id0, 0, 0, 0, 0]`
    OpCode(u8),
    /// `[0x80, 0, 0x85, 0, id2, id1, id0, 0]`
    ChargerProgram,
}

impl PayloadLayout {
    pub fn build(self, serial: SerialNumber) -> [u8; 8] {
        let [id2, id1, id0] = serial.fields();
        match self {
            PayloadLayout::OpCode(op) => [op, id2, id1, id0, 0, 0, 0, 0],
            PayloadLayout::ChargerProgram => [0x80, 0, 0x85, 0, id2, id1, id0, 0],
        }
    }

    /// Recover the serial carried by a payload built with this layout
    pub fn parse(self, data: &[u8]) -> Option<SerialNumber> {
        match self {
            PayloadLayout::OpCode(op) => match data {
                [code, id2, id1, id0, ..] if *code == op => {
                    Some(SerialNumber::from_fields(*id2, *id1, *id0))
                }
                _ => None,
            },
            PayloadLayout::ChargerProgram => match data {
                [0x80, _, 0x85, _, id2, id1, id0, ..] => {
                    Some(SerialNumber::from_fields(*id2, *id1, *id0))
                }
                _ => None,
            },
        }
    }
}

/// A command frame template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTemplate {
    /// Command prefix, shifted by [`DISCOVERY_SHIFT`] to form the identifier
    pub prefix: u32,
    pub layout: PayloadLayout,
}

impl CommandTemplate {
    pub const fn arbitration_id(&self) -> u32 {
        self.prefix << DISCOVERY_SHIFT
    }
}

/// Per-class protocol constants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub class: DeviceClass,
    /// Status broadcast prefix (11 bits)
    pub prefix_code: u32,
    pub discovery_shift: u32,
    pub discovery_mask: u32,
    pub program: CommandTemplate,
    pub clear_status: Option<CommandTemplate>,
    pub reset: Option<CommandTemplate>,
    /// Status byte offset in a full 8-byte status payload
    pub status_byte_index: Option<usize>,
    /// Error code offset in a full 8-byte status payload
    pub error_byte_index: Option<usize>,
}

pub static BATTERY: DeviceProfile = DeviceProfile {
    class: DeviceClass::Battery,
    prefix_code: 0x300,
    discovery_shift: DISCOVERY_SHIFT,
    discovery_mask: DISCOVERY_MASK,
    program: CommandTemplate {
        prefix: 0x600,
        layout: PayloadLayout::OpCode(1),
    },
    clear_status: Some(CommandTemplate {
        prefix: 0x600,
        layout: PayloadLayout::OpCode(2),
    }),
    reset: Some(CommandTemplate {
        prefix: 0x400,
        layout: PayloadLayout::OpCode(4),
    }),
    status_byte_index: Some(7),
    error_byte_index: Some(6),
};

pub static CHARGER: DeviceProfile = DeviceProfile {
    class: DeviceClass::Charger,
    prefix_code: 0x400,
    discovery_shift: DISCOVERY_SHIFT,
    discovery_mask: DISCOVERY_MASK,
    program: CommandTemplate {
        prefix: 0x500,
        layout: PayloadLayout::ChargerProgram,
    },
    clear_status: None,
    reset: None,
    status_byte_index: None,
    error_byte_index: None,
};

const BATTERY_PHASES: [Phase; 5] = [
    Phase::Discover,
    Phase::Command,
    Phase::Verify,
    Phase::ClearStatus,
    Phase::ResetConfirm,
];

const CHARGER_PHASES: [Phase; 3] = [Phase::Discover, Phase::Command, Phase::Verify];

impl DeviceProfile {
    /// Class prefix encoded in `id`
    pub fn prefix_of(&self, id: u32) -> u32 {
        (id >> self.discovery_shift) & self.discovery_mask
    }

    /// Template for `command`, if this class supports it
    pub fn template(&self, command: Command) -> Option<&CommandTemplate> {
        match command {
            Command::ProgramSerial => Some(&self.program),
            Command::ClearCriticalStatus => self.clear_status.as_ref(),
            Command::Reset => self.reset.as_ref(),
        }
    }

    /// Build the outbound frame for `command` addressed with `serial`
    pub fn command_frame(&self, command: Command, serial: SerialNumber) -> Option<CanFrame> {
        let template = self.template(command)?;
        let payload = template.layout.build(serial);
        // Templates are compile-time constants inside the 29-bit range.
        CanFrame::outbound(template.arbitration_id(), &payload).ok()
    }

    /// Decode a command frame addressed to this class
    pub fn decode_command(&self, frame: &CanFrame) -> Option<(Command, SerialNumber)> {
        [
            Command::ProgramSerial,
            Command::ClearCriticalStatus,
            Command::Reset,
        ]
        .into_iter()
        .find_map(|command| {
            let template = self.template(command)?;
            if frame.id() != template.arbitration_id() {
                return None;
            }
            template
                .layout
                .parse(frame.data())
                .map(|serial| (command, serial))
        })
    }

    /// Phases a session for this class runs through, in order
    pub fn phases(&self) -> &'static [Phase] {
        match self.class {
            DeviceClass::Battery => &BATTERY_PHASES,
            DeviceClass::Charger => &CHARGER_PHASES,
        }
    }

    /// Identifier of a status frame this class would broadcast for `serial`
    pub fn status_id(&self, serial: SerialNumber) -> u32 {
        (self.prefix_code << self.discovery_shift) | serial.value()
    }
}
