//! CAN frames as seen by the provisioning protocol

use std::fmt;

use serde::Serialize;

use crate::error::FrameError;

/// Direction of a frame relative to this tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the bus
    Inbound,
    /// Built here for transmission
    Outbound,
}

/// An extended-identifier CAN frame with up to 8 payload bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanFrame {
    id: u32,
    data: Vec<u8>,
    direction: Direction,
}

impl CanFrame {
    /// Largest 29-bit identifier
    pub const MAX_ID: u32 = 0x1FFF_FFFF;
    /// Classic CAN payload limit
    pub const MAX_DATA_LEN: usize = 8;

    fn new(id: u32, data: &[u8], direction: Direction) -> Result<Self, FrameError> {
        if id > Self::MAX_ID {
            return Err(FrameError::IdentifierTooWide(id));
        }
        if data.len() > Self::MAX_DATA_LEN {
            return Err(FrameError::PayloadTooLong(data.len()));
        }
        Ok(Self {
            id,
            data: data.to_vec(),
            direction,
        })
    }

    /// A frame received from the bus
    pub fn inbound(id: u32, data: &[u8]) -> Result<Self, FrameError> {
        Self::new(id, data, Direction::Inbound)
    }

    /// A frame to be transmitted
    pub fn outbound(id: u32, data: &[u8]) -> Result<Self, FrameError> {
        Self::new(id, data, Direction::Outbound)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:08X} [{}] {}",
            self.id,
            self.data.len(),
            hex::encode_upper(&self.data)
        )
    }
}
