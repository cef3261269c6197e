//! Receive loop bounded by a frame count and a wall-clock deadline
//!
//! Every poll is bounded twice: by the number of frames actually received
//! and by a deadline. A receive that yields nothing (driver timeout) only
//! spends time, so a silent bus ends on the deadline and a flooded bus ends
//! on the frame count.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::PollBudget;
use crate::error::BusError;
use crate::frame::CanFrame;

/// Which budget ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exhaustion {
    FrameBudget,
    Deadline,
}

/// Result of a bounded poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// A received frame satisfied the predicate
    Matched(CanFrame),
    /// The budget ran out first
    Exhausted(Exhaustion),
}

impl PollOutcome {
    pub fn matched(self) -> Option<CanFrame> {
        match self {
            PollOutcome::Matched(frame) => Some(frame),
            PollOutcome::Exhausted(_) => None,
        }
    }
}

/// A single bounded poll and its running frame count
#[derive(Debug, Clone)]
pub struct BoundedPoller {
    max_frames: usize,
    deadline: Instant,
    received: usize,
}

impl BoundedPoller {
    pub fn new(max_frames: usize, deadline: Instant) -> Self {
        Self {
            max_frames,
            deadline,
            received: 0,
        }
    }

    /// Start a poll whose deadline is `budget` from now
    pub fn start(budget: &PollBudget) -> Self {
        Self::new(budget.max_frames, Instant::now() + budget.deadline())
    }

    /// Frames received so far, matched or not
    pub fn frames_received(&self) -> usize {
        self.received
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Receive until `predicate` matches or a budget runs out
    ///
    /// `receive` is handed the time left before the deadline and should block
    /// no longer than that; `Ok(None)` means nothing arrived. Bus errors end
    /// the poll immediately.
    pub fn run<R, P>(&mut self, mut receive: R, mut predicate: P) -> Result<PollOutcome, BusError>
    where
        R: FnMut(Duration) -> Result<Option<CanFrame>, BusError>,
        P: FnMut(&CanFrame) -> bool,
    {
        loop {
            if self.received >= self.max_frames {
                return Ok(PollOutcome::Exhausted(Exhaustion::FrameBudget));
            }
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(PollOutcome::Exhausted(Exhaustion::Deadline));
            }

            let Some(frame) = receive(remaining)? else {
                continue;
            };
            self.received += 1;

            if predicate(&frame) {
                return Ok(PollOutcome::Matched(frame));
            }
        }
    }
}

/// One-shot bounded poll
pub fn poll<R, P>(
    receive: R,
    predicate: P,
    max_frames: usize,
    deadline: Instant,
) -> Result<PollOutcome, BusError>
where
    R: FnMut(Duration) -> Result<Option<CanFrame>, BusError>,
    P: FnMut(&CanFrame) -> bool,
{
    BoundedPoller::new(max_frames, deadline).run(receive, predicate)
}
