//! Inbound frame classification

use serde::Serialize;

use crate::frame::CanFrame;
use crate::profile::{DeviceProfile, ERROR_NONE, STATUS_NOMINAL};
use crate::serial::SerialNumber;

/// Payload length needed before status/error bytes are read
const STATUS_PAYLOAD_LEN: usize = 8;

/// Fields extracted from a status broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusFields {
    /// Serial number carried in the low 20 identifier bits
    pub serial: SerialNumber,
    /// Status byte, when the payload is long enough and the class has one
    pub status: Option<u8>,
    /// Error byte, when the payload is long enough and the class has one
    pub error: Option<u8>,
}

impl StatusFields {
    /// Status is nominal (no active critical fault)
    pub fn status_nominal(&self) -> bool {
        self.status == Some(STATUS_NOMINAL)
    }

    /// Status nominal and no error code
    pub fn is_clean(&self) -> bool {
        self.status_nominal() && self.error == Some(ERROR_NONE)
    }
}

/// Classify `frame` against `profile`
///
/// Returns `None` when the frame's prefix does not belong to the profile's
/// device class. A payload shorter than 8 bytes still classifies; its status
/// and error fields are simply absent.
pub fn classify(frame: &CanFrame, profile: &DeviceProfile) -> Option<StatusFields> {
    if profile.prefix_of(frame.id()) != profile.prefix_code {
        return None;
    }

    let data = frame.data();
    let byte_at = |index: Option<usize>| {
        if data.len() >= STATUS_PAYLOAD_LEN {
            index.and_then(|i| data.get(i).copied())
        } else {
            None
        }
    };

    Some(StatusFields {
        serial: SerialNumber::new(frame.id()),
        status: byte_at(profile.status_byte_index),
        error: byte_at(profile.error_byte_index),
    })
}

/// Frame is a status broadcast from this profile's device class
pub fn matches_prefix(frame: &CanFrame, profile: &DeviceProfile) -> bool {
    classify(frame, profile).is_some()
}

/// Frame is a status broadcast from the device now using `serial`
pub fn reports_serial(frame: &CanFrame, profile: &DeviceProfile, serial: SerialNumber) -> bool {
    classify(frame, profile).is_some_and(|fields| fields.serial == serial)
}

/// Frame reports `serial` with a nominal status byte
pub fn reports_clear_status(
    frame: &CanFrame,
    profile: &DeviceProfile,
    serial: SerialNumber,
) -> bool {
    classify(frame, profile).is_some_and(|fields| fields.serial == serial && fields.status_nominal())
}
