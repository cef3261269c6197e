//! The provisioning state machine

use std::time::Duration;

use tracing::{debug, info, warn};

use super::{Outcome, Phase, ProvisioningReport, ProvisioningSession};
use crate::bus::CanBus;
use crate::config::{PhaseBudgets, PollBudget, ProvisionerConfig};
use crate::error::{BusError, ProvisioningError};
use crate::filter::{self, StatusFields};
use crate::frame::CanFrame;
use crate::poller::{BoundedPoller, PollOutcome};
use crate::profile::{Command, DeviceClass, DeviceProfile};
use crate::serial::SerialNumber;

/// Drives one device through the provisioning phases over a bus
///
/// The machine borrows the bus exclusively for as long as it lives; runs are
/// sequential.
pub struct ProvisioningStateMachine<'a, B: CanBus + ?Sized> {
    bus: &'a mut B,
    budgets: PhaseBudgets,
    receive_timeout: Duration,
}

impl<'a, B: CanBus + ?Sized> ProvisioningStateMachine<'a, B> {
    pub fn new(bus: &'a mut B, config: &ProvisionerConfig) -> Self {
        Self::with_budgets(bus, config.budgets, config.receive_timeout())
    }

    pub fn with_budgets(bus: &'a mut B, budgets: PhaseBudgets, receive_timeout: Duration) -> Self {
        Self {
            bus,
            budgets,
            receive_timeout,
        }
    }

    /// Provision `target` into the first `class` device found on the bus
    pub fn run(&mut self, class: DeviceClass, target: SerialNumber) -> ProvisioningReport {
        let profile = class.profile();
        let mut session = ProvisioningSession::new(class, target);

        info!(
            class = %class,
            target = %target,
            interface = self.bus.interface(),
            "Starting provisioning session"
        );

        let outcome = match self.drive(profile, &mut session) {
            Ok(outcome) => outcome,
            Err(reason) => {
                warn!(
                    phase = ?session.phase(),
                    reason = %reason,
                    "Provisioning failed"
                );
                Outcome::Failed { reason }
            }
        };

        info!(outcome = %outcome, "Provisioning session finished");
        session.finish(outcome)
    }

    fn drive(
        &mut self,
        profile: &DeviceProfile,
        session: &mut ProvisioningSession,
    ) -> Result<Outcome, ProvisioningError> {
        let mut outcome = Outcome::Succeeded {
            residual_error_ok: None,
            last_observation: None,
        };

        for &phase in profile.phases() {
            session.enter(phase);
            debug!(phase = %phase, "Entering phase");

            match phase {
                Phase::Discover => self.discover(profile, session)?,
                Phase::Command => {
                    self.transmit(profile, Command::ProgramSerial, session.target())?
                }
                Phase::Verify => self.verify(profile, session)?,
                Phase::ClearStatus => self.clear_status(profile, session)?,
                Phase::ResetConfirm => outcome = self.reset_confirm(profile, session)?,
            }
        }

        Ok(outcome)
    }

    fn discover(
        &mut self,
        profile: &DeviceProfile,
        session: &mut ProvisioningSession,
    ) -> Result<(), ProvisioningError> {
        let budget = self.budgets.discover;
        let outcome = self.poll_phase(session, budget, |frame| {
            filter::matches_prefix(frame, profile)
        })?;

        let frame = outcome.matched().ok_or(ProvisioningError::DeviceNotFound)?;
        if let Some(fields) = filter::classify(&frame, profile) {
            info!(
                class = %profile.class,
                current_serial = %fields.serial,
                "Device found"
            );
            session.set_discovered(fields.serial);
        }
        Ok(())
    }

    fn verify(
        &mut self,
        profile: &DeviceProfile,
        session: &mut ProvisioningSession,
    ) -> Result<(), ProvisioningError> {
        let target = session.target();
        let budget = self.budgets.verify;
        let outcome = self.poll_phase(session, budget, |frame| {
            filter::reports_serial(frame, profile, target)
        })?;

        outcome
            .matched()
            .ok_or(ProvisioningError::ProgrammingUnconfirmed(target))?;
        info!(serial = %target, "Serial number programmed");
        Ok(())
    }

    fn clear_status(
        &mut self,
        profile: &DeviceProfile,
        session: &mut ProvisioningSession,
    ) -> Result<(), ProvisioningError> {
        let target = session.target();
        self.transmit(profile, Command::ClearCriticalStatus, target)?;

        let budget = self.budgets.clear_status;
        let outcome = self.poll_phase(session, budget, |frame| {
            filter::reports_clear_status(frame, profile, target)
        })?;

        outcome
            .matched()
            .ok_or(ProvisioningError::StatusClearRejected)?;
        info!("Status clear command accepted");
        Ok(())
    }

    /// Reset, then watch the device's broadcasts for the whole budget
    ///
    /// The device keeps cycling through its error codes after a reset, so
    /// only the last matching broadcast counts.
    fn reset_confirm(
        &mut self,
        profile: &DeviceProfile,
        session: &mut ProvisioningSession,
    ) -> Result<Outcome, ProvisioningError> {
        let target = session.target();
        self.transmit(profile, Command::Reset, target)?;

        let budget = self.budgets.reset_confirm;
        let mut latest: Option<StatusFields> = None;
        self.poll_phase(session, budget, |frame| {
            // Frames too short to carry status and error bytes leave the
            // previous observation in place.
            if let Some(fields) = filter::classify(frame, profile) {
                if fields.serial == target && fields.status.is_some() && fields.error.is_some() {
                    latest = Some(fields);
                }
            }
            false
        })?;
        session.observe(latest);

        let residual_error_ok = latest.is_some_and(|fields| fields.is_clean());
        if residual_error_ok {
            info!("Device programmed and cleared of errors");
        } else {
            warn!(last_observation = ?latest, "Device programmed but reporting errors");
        }

        Ok(Outcome::Succeeded {
            residual_error_ok: Some(residual_error_ok),
            last_observation: latest,
        })
    }

    fn transmit(
        &mut self,
        profile: &DeviceProfile,
        command: Command,
        serial: SerialNumber,
    ) -> Result<(), ProvisioningError> {
        let frame = profile.command_frame(command, serial).ok_or_else(|| {
            BusError::Unsupported(format!("{:?} for {}", command, profile.class))
        })?;

        info!(command = ?command, %frame, "Transmitting command");
        self.bus.send(&frame)?;
        Ok(())
    }

    fn poll_phase<P>(
        &mut self,
        session: &mut ProvisioningSession,
        budget: PollBudget,
        predicate: P,
    ) -> Result<PollOutcome, ProvisioningError>
    where
        P: FnMut(&CanFrame) -> bool,
    {
        let mut poller = BoundedPoller::start(&budget);
        session.set_deadline(poller.deadline());

        let per_call = self.receive_timeout;
        let bus = &mut *self.bus;
        let result = poller.run(|remaining| bus.recv(per_call.min(remaining)), predicate);
        session.set_frames_examined(poller.frames_received());

        let outcome = result?;
        if let PollOutcome::Exhausted(exhaustion) = &outcome {
            debug!(
                phase = ?session.phase(),
                exhaustion = ?exhaustion,
                frames = poller.frames_received(),
                "Poll budget exhausted"
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MockBus;
    use crate::profile::{BATTERY, CHARGER};
    use pretty_assertions::assert_eq;

    fn status(profile: &DeviceProfile, serial: u32, error: u8, status: u8) -> CanFrame {
        CanFrame::inbound(
            profile.status_id(SerialNumber::new(serial)),
            &[0, 0, 0, 0, 0, 0, error, status],
        )
        .unwrap()
    }

    fn noise(i: u32) -> CanFrame {
        CanFrame::inbound(0x0100_0000 | i, &[0xAA; 8]).unwrap()
    }

    fn fast_budgets() -> PhaseBudgets {
        PhaseBudgets::default().with_deadline_ms(200)
    }

    fn machine(bus: &mut MockBus) -> ProvisioningStateMachine<'_, MockBus> {
        ProvisioningStateMachine::with_budgets(bus, fast_budgets(), Duration::from_millis(5))
    }

    fn phases(report: &ProvisioningReport) -> Vec<Phase> {
        report.phases.iter().map(|r| r.phase).collect()
    }

    #[test]
    fn test_discover_finds_device_among_noise() {
        let mut bus = MockBus::new();
        bus.push_frames((0..25).map(noise));
        bus.push_frame(status(&BATTERY, 0x12345, 0, 0x80));
        bus.push_frames((25..50).map(noise));

        let report = machine(&mut bus).run(DeviceClass::Battery, SerialNumber::new(0x12345));

        assert_eq!(report.discovered, Some(SerialNumber::new(0x12345)));
        assert_eq!(report.phases[0].phase, Phase::Discover);
        assert_eq!(report.phases[0].frames_examined, 26);
        // Program command went out after discovery
        assert_eq!(bus.sent()[0].id(), 0x1800_0000);
    }

    #[test]
    fn test_discover_fails_on_silent_bus() {
        let mut bus = MockBus::new();
        let report = machine(&mut bus).run(DeviceClass::Battery, SerialNumber::new(1));

        assert_eq!(report.failure(), Some(&ProvisioningError::DeviceNotFound));
        assert_eq!(phases(&report), vec![Phase::Discover]);
        assert!(bus.sent().is_empty());
    }

    #[test]
    fn test_discover_fails_when_frame_budget_spent() {
        let mut bus = MockBus::new();
        bus.push_frames((0..100).map(noise));
        bus.push_frame(status(&BATTERY, 5, 0, 0x80));

        let report = machine(&mut bus).run(DeviceClass::Battery, SerialNumber::new(5));

        assert_eq!(report.failure(), Some(&ProvisioningError::DeviceNotFound));
        assert_eq!(report.phases[0].frames_examined, 100);
        assert_eq!(bus.pending(), 1);
    }

    #[test]
    fn test_verify_moves_battery_to_clear_status() {
        let mut bus = MockBus::new();
        bus.push_frame(status(&BATTERY, 0x00001, 0, 0x00));
        bus.push_frame(status(&BATTERY, 0x12345, 0, 0x00));

        let report = machine(&mut bus).run(DeviceClass::Battery, SerialNumber::new(0x12345));

        // Status byte never clears, so the session stops in ClearStatus
        assert_eq!(
            phases(&report),
            vec![Phase::Discover, Phase::Command, Phase::Verify, Phase::ClearStatus]
        );
        assert_eq!(report.failure(), Some(&ProvisioningError::StatusClearRejected));
        assert_eq!(bus.sent()[1].data(), &[2, 0x01, 0x23, 0x45, 0, 0, 0, 0]);
    }

    #[test]
    fn test_verify_succeeds_charger() {
        let mut bus = MockBus::new();
        bus.push_frame(CanFrame::inbound(CHARGER.status_id(SerialNumber::new(3)), &[0; 8]).unwrap());
        bus.push_frame(
            CanFrame::inbound(CHARGER.status_id(SerialNumber::new(0x12345)), &[0; 8]).unwrap(),
        );

        let report = machine(&mut bus).run(DeviceClass::Charger, SerialNumber::new(0x12345));

        assert!(report.is_success());
        assert_eq!(
            report.outcome,
            Outcome::Succeeded {
                residual_error_ok: None,
                last_observation: None
            }
        );
        assert_eq!(
            phases(&report),
            vec![Phase::Discover, Phase::Command, Phase::Verify]
        );
        assert_eq!(bus.sent().len(), 1);
        assert_eq!(bus.sent()[0].id(), 0x1400_0000);
        assert_eq!(bus.sent()[0].data(), &[0x80, 0, 0x85, 0, 0x01, 0x23, 0x45, 0]);
    }

    #[test]
    fn test_verify_fails_when_serial_never_reported() {
        let mut bus = MockBus::new();
        bus.set_idle_frame(Some(status(&BATTERY, 99, 0, 0x80)));

        let report = machine(&mut bus).run(DeviceClass::Battery, SerialNumber::new(75));

        assert_eq!(
            report.failure(),
            Some(&ProvisioningError::ProgrammingUnconfirmed(SerialNumber::new(75)))
        );
        // The frame budget, not the deadline, ends a flooded verify
        assert_eq!(report.phases[2].frames_examined, 1000);
    }

    #[test]
    fn test_reset_confirm_latest_observation_wins() {
        let mut bus = MockBus::new();
        bus.push_frame(status(&BATTERY, 75, 0, 0x80));
        bus.push_frame(status(&BATTERY, 75, 0, 0x80));
        bus.push_frame(status(&BATTERY, 75, 0, 0x80));
        bus.push_frame(status(&BATTERY, 75, 0x12, 0x00));
        bus.push_frame(status(&BATTERY, 75, 0x13, 0x80));
        bus.push_frame(status(&BATTERY, 75, 0x00, 0x80));

        let report = machine(&mut bus).run(DeviceClass::Battery, SerialNumber::new(75));

        assert_eq!(
            report.outcome,
            Outcome::Succeeded {
                residual_error_ok: Some(true),
                last_observation: Some(StatusFields {
                    serial: SerialNumber::new(75),
                    status: Some(0x80),
                    error: Some(0x00),
                }),
            }
        );
        assert_eq!(report.residual_error(), None);
    }

    #[test]
    fn test_reset_confirm_later_fault_masks_earlier_clean() {
        let mut bus = MockBus::new();
        bus.push_frames([
            status(&BATTERY, 75, 0, 0x80),
            status(&BATTERY, 75, 0, 0x80),
            status(&BATTERY, 75, 0, 0x80),
            status(&BATTERY, 75, 0x00, 0x80),
            status(&BATTERY, 75, 0x07, 0x80),
        ]);

        let report = machine(&mut bus).run(DeviceClass::Battery, SerialNumber::new(75));

        assert!(report.is_success());
        assert_eq!(
            report.residual_error(),
            Some(ProvisioningError::ResidualErrorPresent {
                status: Some(0x80),
                error: Some(0x07)
            })
        );
    }

    #[test]
    fn test_reset_confirm_without_observation_is_not_ok() {
        let mut bus = MockBus::new();
        bus.push_frames([
            status(&BATTERY, 75, 0, 0x80),
            status(&BATTERY, 75, 0, 0x80),
            status(&BATTERY, 75, 0, 0x80),
        ]);

        let report = machine(&mut bus).run(DeviceClass::Battery, SerialNumber::new(75));

        assert_eq!(
            report.outcome,
            Outcome::Succeeded {
                residual_error_ok: Some(false),
                last_observation: None,
            }
        );
        assert_eq!(
            report.residual_error(),
            Some(ProvisioningError::ResidualErrorPresent {
                status: None,
                error: None
            })
        );
    }

    #[test]
    fn test_reset_confirm_ignores_short_frames() {
        let mut bus = MockBus::new();
        bus.push_frames([
            status(&BATTERY, 75, 0, 0x80),
            status(&BATTERY, 75, 0, 0x80),
            status(&BATTERY, 75, 0, 0x80),
            status(&BATTERY, 75, 0x00, 0x80),
            CanFrame::inbound(BATTERY.status_id(SerialNumber::new(75)), &[0x01, 0x02]).unwrap(),
        ]);

        let report = machine(&mut bus).run(DeviceClass::Battery, SerialNumber::new(75));

        assert_eq!(
            report.outcome,
            Outcome::Succeeded {
                residual_error_ok: Some(true),
                last_observation: Some(StatusFields {
                    serial: SerialNumber::new(75),
                    status: Some(0x80),
                    error: Some(0x00),
                }),
            }
        );
        assert_eq!(report.residual_error(), None);
    }

    #[test]
    fn test_reset_confirm_stops_after_frame_budget() {
        let mut bus = MockBus::new();
        bus.set_idle_frame(Some(status(&BATTERY, 75, 0, 0x80)));

        let report = machine(&mut bus).run(DeviceClass::Battery, SerialNumber::new(75));

        let reset = report.phases.last().unwrap();
        assert_eq!(reset.phase, Phase::ResetConfirm);
        assert_eq!(reset.frames_examined, 40);
        assert_eq!(bus.sent().last().unwrap().data(), &[4, 0, 0, 75, 0, 0, 0, 0]);
        assert_eq!(bus.sent().last().unwrap().id(), 0x1000_0000);
    }

    #[test]
    fn test_bus_failure_fails_session() {
        let mut bus = MockBus::new();
        bus.close();

        let report = machine(&mut bus).run(DeviceClass::Battery, SerialNumber::new(75));

        assert_eq!(
            report.failure(),
            Some(&ProvisioningError::Bus(BusError::Closed))
        );
    }

    #[test]
    fn test_poll_deadline_bounds_phase() {
        let mut bus = MockBus::new();
        let budgets = PhaseBudgets::default().with_deadline_ms(30);
        let mut machine =
            ProvisioningStateMachine::with_budgets(&mut bus, budgets, Duration::from_secs(1));

        let started = std::time::Instant::now();
        let report = machine.run(DeviceClass::Charger, SerialNumber::new(1));

        assert_eq!(report.failure(), Some(&ProvisioningError::DeviceNotFound));
        assert!(started.elapsed() < Duration::from_millis(900));
    }
}
