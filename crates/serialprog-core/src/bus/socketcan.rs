//! SocketCAN adapter on a raw CAN socket

use std::time::{Duration, Instant};

use socketcan::{CanFrame as RawFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket};
use tracing::{debug, info};

use crate::config::SocketCanConfig;
use crate::error::{BusError, FrameError};
use crate::frame::CanFrame;

/// Poll interval while the non-blocking socket has nothing to read
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Raw SocketCAN bus carrying 29-bit extended frames
pub struct SocketCanBus {
    interface: String,
    socket: CanSocket,
}

impl SocketCanBus {
    /// Open `config.interface` and discard anything already queued on it
    pub fn open(config: &SocketCanConfig) -> Result<Self, BusError> {
        let socket = CanSocket::open(&config.interface).map_err(|e| {
            BusError::Open(format!(
                "Failed to open raw CAN socket on {}: {}",
                config.interface, e
            ))
        })?;

        socket
            .set_nonblocking(true)
            .map_err(|e| BusError::Open(format!("Failed to set non-blocking: {}", e)))?;

        Self::drain_socket(&socket);

        info!(
            interface = %config.interface,
            bitrate = config.bitrate,
            "Opened SocketCAN bus"
        );

        Ok(Self {
            interface: config.interface.clone(),
            socket,
        })
    }

    /// Drop stale frames queued before this session started
    fn drain_socket(socket: &CanSocket) {
        let mut drained = 0usize;
        while socket.read_frame().is_ok() {
            drained += 1;
        }
        if drained > 0 {
            debug!(drained, "Drained stale frames from socket");
        }
    }

    /// Convert an extended data frame; anything else is not protocol traffic
    fn convert(frame: &RawFrame) -> Option<CanFrame> {
        if !matches!(frame, RawFrame::Data(_)) || !frame.is_extended() {
            return None;
        }
        CanFrame::inbound(frame.raw_id(), frame.data()).ok()
    }
}

impl super::CanBus for SocketCanBus {
    fn send(&mut self, frame: &CanFrame) -> Result<(), BusError> {
        let id = ExtendedId::new(frame.id())
            .ok_or(BusError::InvalidFrame(FrameError::IdentifierTooWide(frame.id())))?;
        let raw = RawFrame::new(id, frame.data()).ok_or(BusError::InvalidFrame(
            FrameError::PayloadTooLong(frame.data().len()),
        ))?;

        self.socket
            .write_frame(&raw)
            .map_err(|e| BusError::Send(format!("{} on {}", e, self.interface)))?;

        debug!(%frame, "Sent frame");
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>, BusError> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.socket.read_frame() {
                Ok(raw) => {
                    if let Some(frame) = Self::convert(&raw) {
                        debug!(%frame, "Received frame");
                        return Ok(Some(frame));
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(IDLE_SLEEP);
                }
                Err(e) => {
                    return Err(BusError::Receive(format!("{} on {}", e, self.interface)));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    fn interface(&self) -> &str {
        &self.interface
    }
}
