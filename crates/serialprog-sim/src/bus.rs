//! In-process bus wired to a simulated device
//!
//! Every receive yields the device's next status broadcast, optionally
//! interleaved with unrelated traffic. Sent frames reach the device
//! immediately, so a full provisioning session runs without real time
//! passing.

use std::time::Duration;

use serialprog_core::{BusError, CanBus, CanFrame};
use tracing::debug;

use crate::device::SimulatedDevice;

/// Bus with exactly one simulated device attached
pub struct SimBus {
    device: SimulatedDevice,
    noise: Vec<CanFrame>,
    noise_every: usize,
    noise_pos: usize,
    since_noise: usize,
    sent: Vec<CanFrame>,
}

impl SimBus {
    pub fn new(device: SimulatedDevice) -> Self {
        Self {
            device,
            noise: Vec::new(),
            noise_every: 0,
            noise_pos: 0,
            since_noise: 0,
            sent: Vec::new(),
        }
    }

    /// Insert one of `frames` (in rotation) after every `every` device frames
    pub fn with_noise(mut self, frames: Vec<CanFrame>, every: usize) -> Self {
        self.noise = frames;
        self.noise_every = every;
        self
    }

    pub fn device(&self) -> &SimulatedDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut SimulatedDevice {
        &mut self.device
    }

    /// Frames sent so far
    pub fn sent(&self) -> &[CanFrame] {
        &self.sent
    }

    fn next_noise(&mut self) -> Option<CanFrame> {
        if self.noise.is_empty() || self.noise_every == 0 || self.since_noise < self.noise_every {
            return None;
        }
        self.since_noise = 0;
        let frame = self.noise[self.noise_pos % self.noise.len()].clone();
        self.noise_pos += 1;
        Some(frame)
    }
}

impl CanBus for SimBus {
    fn send(&mut self, frame: &CanFrame) -> Result<(), BusError> {
        debug!(frame = %frame, "SimBus send");
        self.sent.push(frame.clone());
        self.device.handle_frame(frame);
        Ok(())
    }

    fn recv(&mut self, _timeout: Duration) -> Result<Option<CanFrame>, BusError> {
        if let Some(frame) = self.next_noise() {
            return Ok(Some(frame));
        }
        self.since_noise += 1;
        Ok(Some(self.device.status_frame()?))
    }

    fn interface(&self) -> &str {
        "sim"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serialprog_core::{DeviceClass, SerialNumber};

    #[test]
    fn test_noise_interleaving() {
        let noise = CanFrame::inbound(0x123, &[0xAA]).unwrap();
        let mut bus = SimBus::new(SimulatedDevice::new(DeviceClass::Battery, SerialNumber::new(5)))
            .with_noise(vec![noise], 2);

        let ids: Vec<u32> = (0..6)
            .map(|_| bus.recv(Duration::ZERO).unwrap().unwrap().id())
            .collect();
        let device_id = (0x300 << 18) | 5;
        assert_eq!(
            ids,
            vec![device_id, device_id, 0x123, device_id, device_id, 0x123]
        );
    }

    #[test]
    fn test_send_reaches_device() {
        let mut bus = SimBus::new(SimulatedDevice::new(DeviceClass::Charger, SerialNumber::new(1)));
        let program = DeviceClass::Charger
            .profile()
            .command_frame(serialprog_core::Command::ProgramSerial, SerialNumber::new(99))
            .unwrap();

        bus.send(&program).unwrap();

        assert_eq!(bus.sent().len(), 1);
        assert_eq!(bus.device().serial(), SerialNumber::new(99));
        let frame = bus.recv(Duration::ZERO).unwrap().unwrap();
        assert_eq!(frame.id(), (0x400 << 18) | 99);
    }
}
