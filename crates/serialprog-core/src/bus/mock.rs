//! Mock bus adapter for testing

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::BusError;
use crate::frame::CanFrame;

type Responder = Box<dyn FnMut(&CanFrame) -> Vec<CanFrame> + Send>;

/// In-memory bus replaying a scripted frame stream
///
/// Scripted entries are consumed one per [`CanBus::recv`](super::CanBus::recv)
/// call; a `None` entry is a receive timeout. Once the script is empty the
/// idle frame (if any) is returned on every call, otherwise the bus is
/// silent and each receive sleeps for its timeout.
#[derive(Default)]
pub struct MockBus {
    inbound: VecDeque<Option<CanFrame>>,
    idle: Option<CanFrame>,
    sent: Vec<CanFrame>,
    responder: Option<Responder>,
    closed: bool,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inbound frame
    pub fn push_frame(&mut self, frame: CanFrame) {
        self.inbound.push_back(Some(frame));
    }

    /// Queue several inbound frames
    pub fn push_frames(&mut self, frames: impl IntoIterator<Item = CanFrame>) {
        self.inbound.extend(frames.into_iter().map(Some));
    }

    /// Queue one receive timeout
    pub fn push_silence(&mut self) {
        self.inbound.push_back(None);
    }

    /// Frame repeated once the script runs dry (a periodic broadcast)
    pub fn set_idle_frame(&mut self, frame: Option<CanFrame>) {
        self.idle = frame;
    }

    /// Install a hook that injects inbound frames in reaction to a send
    pub fn on_send<F>(&mut self, responder: F)
    where
        F: FnMut(&CanFrame) -> Vec<CanFrame> + Send + 'static,
    {
        self.responder = Some(Box::new(responder));
    }

    /// Simulate the interface going away
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Frames sent so far, in order
    pub fn sent(&self) -> &[CanFrame] {
        &self.sent
    }

    /// Scripted entries not yet consumed
    pub fn pending(&self) -> usize {
        self.inbound.len()
    }
}

impl super::CanBus for MockBus {
    fn send(&mut self, frame: &CanFrame) -> Result<(), BusError> {
        if self.closed {
            return Err(BusError::Closed);
        }

        tracing::debug!(%frame, "Mock bus: sent frame");
        self.sent.push(frame.clone());

        if let Some(responder) = self.responder.as_mut() {
            let replies = responder(frame);
            self.inbound.extend(replies.into_iter().map(Some));
        }
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>, BusError> {
        if self.closed {
            return Err(BusError::Closed);
        }

        match self.inbound.pop_front() {
            Some(entry) => Ok(entry),
            None => match &self.idle {
                Some(frame) => Ok(Some(frame.clone())),
                None => {
                    std::thread::sleep(timeout);
                    Ok(None)
                }
            },
        }
    }

    fn interface(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::super::CanBus;
    use super::*;

    fn frame(id: u32) -> CanFrame {
        CanFrame::inbound(id, &[]).unwrap()
    }

    #[test]
    fn test_replays_script_then_idle() {
        let mut bus = MockBus::new();
        bus.push_frame(frame(1));
        bus.push_silence();
        bus.set_idle_frame(Some(frame(9)));

        let timeout = Duration::from_millis(1);
        assert_eq!(bus.recv(timeout).unwrap(), Some(frame(1)));
        assert_eq!(bus.recv(timeout).unwrap(), None);
        assert_eq!(bus.recv(timeout).unwrap(), Some(frame(9)));
        assert_eq!(bus.recv(timeout).unwrap(), Some(frame(9)));
    }

    #[test]
    fn test_responder_injects_replies() {
        let mut bus = MockBus::new();
        bus.on_send(|sent| vec![CanFrame::inbound(sent.id() + 1, &[]).unwrap()]);

        let out = CanFrame::outbound(0x100, &[1]).unwrap();
        bus.send(&out).unwrap();
        assert_eq!(bus.sent(), &[out]);
        assert_eq!(bus.recv(Duration::from_millis(1)).unwrap(), Some(frame(0x101)));
    }

    #[test]
    fn test_closed_bus_errors() {
        let mut bus = MockBus::new();
        bus.close();
        assert_eq!(bus.recv(Duration::from_millis(1)), Err(BusError::Closed));
        let out = CanFrame::outbound(0x100, &[]).unwrap();
        assert_eq!(bus.send(&out), Err(BusError::Closed));
    }
}
