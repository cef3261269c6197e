//! Provisioning sessions
//!
//! A [`ProvisioningSession`] is the state of one run of the
//! [`ProvisioningStateMachine`]: the phase it is in, how much of the current
//! phase's budget it has used, and what it has observed. It is created when
//! a run starts, only ever moves forward, and is turned into a
//! [`ProvisioningReport`] when the run ends.

mod machine;

pub use machine::ProvisioningStateMachine;

use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::error::ProvisioningError;
use crate::filter::StatusFields;
use crate::profile::DeviceClass;
use crate::serial::SerialNumber;

/// Provisioning phases, in protocol order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Wait for any status broadcast from the device class
    Discover,
    /// Send the program-serial command
    Command,
    /// Wait for the device to report the new serial
    Verify,
    /// Clear a latched critical status and wait for a nominal status byte
    ClearStatus,
    /// Reset the device and watch its status settle
    ResetConfirm,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Discover => "discover",
            Phase::Command => "command",
            Phase::Verify => "verify",
            Phase::ClearStatus => "clear_status",
            Phase::ResetConfirm => "reset_confirm",
        };
        write!(f, "{}", s)
    }
}

/// What one completed (or aborted) phase consumed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    /// Frames received while the phase was polling
    pub frames_examined: usize,
    pub elapsed_ms: u64,
}

/// Terminal result of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded {
        /// Whether the last status seen after reset was clean; `None` for
        /// classes without a reset phase
        residual_error_ok: Option<bool>,
        /// Last status broadcast seen after reset
        last_observation: Option<StatusFields>,
    },
    Failed {
        reason: ProvisioningError,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Succeeded {
                residual_error_ok: Some(false),
                ..
            } => write!(f, "succeeded with residual errors"),
            Outcome::Succeeded { .. } => write!(f, "succeeded"),
            Outcome::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Final report of a provisioning run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisioningReport {
    pub class: DeviceClass,
    pub target: SerialNumber,
    /// Serial the device was reporting when discovered
    pub discovered: Option<SerialNumber>,
    pub outcome: Outcome,
    pub phases: Vec<PhaseRecord>,
}

impl ProvisioningReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded { .. })
    }

    /// Why the session failed, if it did
    pub fn failure(&self) -> Option<&ProvisioningError> {
        match &self.outcome {
            Outcome::Failed { reason } => Some(reason),
            Outcome::Succeeded { .. } => None,
        }
    }

    /// Non-fatal residual error left after a successful run
    pub fn residual_error(&self) -> Option<ProvisioningError> {
        match &self.outcome {
            Outcome::Succeeded {
                residual_error_ok: Some(false),
                last_observation,
            } => Some(ProvisioningError::ResidualErrorPresent {
                status: last_observation.and_then(|o| o.status),
                error: last_observation.and_then(|o| o.error),
            }),
            _ => None,
        }
    }
}

/// Mutable state of one provisioning run
#[derive(Debug)]
pub struct ProvisioningSession {
    class: DeviceClass,
    target: SerialNumber,
    phase: Option<Phase>,
    frames_examined: usize,
    phase_started: Instant,
    phase_deadline: Option<Instant>,
    discovered: Option<SerialNumber>,
    latest_observation: Option<StatusFields>,
    history: Vec<PhaseRecord>,
}

impl ProvisioningSession {
    pub fn new(class: DeviceClass, target: SerialNumber) -> Self {
        Self {
            class,
            target,
            phase: None,
            frames_examined: 0,
            phase_started: Instant::now(),
            phase_deadline: None,
            discovered: None,
            latest_observation: None,
            history: Vec::new(),
        }
    }

    pub fn class(&self) -> DeviceClass {
        self.class
    }

    pub fn target(&self) -> SerialNumber {
        self.target
    }

    /// Current phase; `None` before the first phase starts
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    /// Frames received in the current phase
    pub fn frames_examined(&self) -> usize {
        self.frames_examined
    }

    /// Deadline of the current phase's poll, once it has started polling
    pub fn phase_deadline(&self) -> Option<Instant> {
        self.phase_deadline
    }

    pub fn discovered(&self) -> Option<SerialNumber> {
        self.discovered
    }

    pub fn latest_observation(&self) -> Option<StatusFields> {
        self.latest_observation
    }

    /// Move to `next`, closing the current phase's record
    ///
    /// Phases only move forward.
    pub(crate) fn enter(&mut self, next: Phase) {
        debug_assert!(
            self.phase.map_or(true, |current| next > current),
            "phase {:?} re-entered after {:?}",
            next,
            self.phase
        );
        self.close_phase();
        self.phase = Some(next);
        self.frames_examined = 0;
        self.phase_started = Instant::now();
        self.phase_deadline = None;
    }

    pub(crate) fn set_deadline(&mut self, deadline: Instant) {
        self.phase_deadline = Some(deadline);
    }

    pub(crate) fn set_frames_examined(&mut self, frames: usize) {
        self.frames_examined = frames;
    }

    pub(crate) fn set_discovered(&mut self, serial: SerialNumber) {
        self.discovered = Some(serial);
    }

    pub(crate) fn observe(&mut self, observation: Option<StatusFields>) {
        self.latest_observation = observation;
    }

    fn close_phase(&mut self) {
        if let Some(phase) = self.phase {
            self.history.push(PhaseRecord {
                phase,
                frames_examined: self.frames_examined,
                elapsed_ms: self.phase_started.elapsed().as_millis() as u64,
            });
        }
    }

    /// Consume the session into its report
    pub(crate) fn finish(mut self, outcome: Outcome) -> ProvisioningReport {
        self.close_phase();
        ProvisioningReport {
            class: self.class,
            target: self.target,
            discovered: self.discovered,
            outcome,
            phases: self.history,
        }
    }
}
