//! Passive bus scan
//!
//! Listens to the bus for a fixed window and collects every battery and
//! charger that broadcast a status frame, keyed by class and serial number.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::bus::CanBus;
use crate::error::BusError;
use crate::filter::classify;
use crate::poller::BoundedPoller;
use crate::profile::DeviceClass;
use crate::serial::SerialNumber;

/// A device seen broadcasting during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    pub class: DeviceClass,
    pub serial: SerialNumber,
    /// Status frames received from this device
    pub frames: usize,
    /// Status byte of the most recent frame
    pub status: Option<u8>,
    /// Error byte of the most recent frame
    pub error: Option<u8>,
}

/// Listen for `window` and list every device that reported status
///
/// Devices are ordered by class, then serial.
pub fn scan<B: CanBus + ?Sized>(
    bus: &mut B,
    window: Duration,
    receive_timeout: Duration,
) -> Result<Vec<DiscoveredDevice>, BusError> {
    info!(
        interface = bus.interface(),
        window_ms = window.as_millis() as u64,
        "Starting passive bus scan"
    );

    let mut seen: BTreeMap<(DeviceClass, SerialNumber), DiscoveredDevice> = BTreeMap::new();
    let mut poller = BoundedPoller::new(usize::MAX, Instant::now() + window);

    poller.run(
        |remaining| bus.recv(receive_timeout.min(remaining)),
        |frame| {
            for class in DeviceClass::ALL {
                if let Some(fields) = classify(frame, class.profile()) {
                    let device = seen.entry((class, fields.serial)).or_insert_with(|| {
                        debug!(class = %class, serial = %fields.serial, "Discovered device");
                        DiscoveredDevice {
                            class,
                            serial: fields.serial,
                            frames: 0,
                            status: None,
                            error: None,
                        }
                    });
                    device.frames += 1;
                    device.status = fields.status;
                    device.error = fields.error;
                }
            }
            false
        },
    )?;

    info!(
        discovered = seen.len(),
        frames = poller.frames_received(),
        "Bus scan complete"
    );
    Ok(seen.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MockBus;
    use crate::frame::CanFrame;
    use crate::profile::{BATTERY, CHARGER};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scan_groups_by_class_and_serial() {
        let mut bus = MockBus::new();
        bus.push_frames([
            CanFrame::inbound(BATTERY.status_id(SerialNumber::new(20)), &[0, 0, 0, 0, 0, 0, 3, 0])
                .unwrap(),
            CanFrame::inbound(CHARGER.status_id(SerialNumber::new(7)), &[0; 8]).unwrap(),
            CanFrame::inbound(0x123, &[1, 2]).unwrap(),
            CanFrame::inbound(BATTERY.status_id(SerialNumber::new(5)), &[0; 2]).unwrap(),
            CanFrame::inbound(BATTERY.status_id(SerialNumber::new(20)), &[0, 0, 0, 0, 0, 0, 0, 0x80])
                .unwrap(),
        ]);

        let devices = scan(&mut bus, Duration::from_millis(50), Duration::from_millis(5)).unwrap();

        assert_eq!(
            devices,
            vec![
                DiscoveredDevice {
                    class: DeviceClass::Battery,
                    serial: SerialNumber::new(5),
                    frames: 1,
                    status: None,
                    error: None,
                },
                DiscoveredDevice {
                    class: DeviceClass::Battery,
                    serial: SerialNumber::new(20),
                    frames: 2,
                    status: Some(0x80),
                    error: Some(0x00),
                },
                DiscoveredDevice {
                    class: DeviceClass::Charger,
                    serial: SerialNumber::new(7),
                    frames: 1,
                    status: None,
                    error: None,
                },
            ]
        );
    }

    #[test]
    fn test_scan_of_silent_bus_is_empty() {
        let mut bus = MockBus::new();
        let devices = scan(&mut bus, Duration::from_millis(20), Duration::from_millis(5)).unwrap();
        assert!(devices.is_empty());
    }
}
