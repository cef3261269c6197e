//! serialprog-core - serial number provisioning over CAN
//!
//! This crate drives the provisioning protocol used to program a 20-bit
//! serial number into a battery pack or a charger that broadcasts its status
//! on a CAN bus, and to confirm the device adopted it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               ProvisioningStateMachine                       │
//! │  Discover → Command → Verify → ClearStatus → ResetConfirm    │
//! │                                                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐ │
//! │  │DeviceProfile│  │ FrameFilter │  │ ProvisioningSession │ │
//! │  │ (constants) │  │ (classify)  │  │ (phase, budgets)    │ │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘ │
//! │                          │                                  │
//! │                   ┌──────┴──────┐                           │
//! │                   │BoundedPoller│                           │
//! │                   │(count+time) │                           │
//! │                   └──────┬──────┘                           │
//! │                          │                                  │
//! │                 ┌────────┴────────┐                         │
//! │                 │     CanBus      │                         │
//! │                 │(SocketCAN/mock) │                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use serialprog_core::{bus::MockBus, DeviceClass, ProvisioningStateMachine, SerialNumber};
//!
//! let mut bus = MockBus::new();
//! let mut machine = ProvisioningStateMachine::new(&mut bus, Default::default());
//! let report = machine.run(DeviceClass::Battery, SerialNumber::new(75));
//! println!("{}", report.outcome);
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod filter;
pub mod frame;
pub mod poller;
pub mod profile;
pub mod scan;
pub mod serial;
pub mod session;

pub use bus::{create_bus, CanBus};
pub use config::{BusConfig, PhaseBudgets, PollBudget, ProvisionerConfig};
pub use error::{BusError, ConfigError, FrameError, ProvisioningError};
pub use filter::{classify, StatusFields};
pub use frame::{CanFrame, Direction};
pub use poller::{poll, BoundedPoller, Exhaustion, PollOutcome};
pub use profile::{Command, DeviceClass, DeviceProfile};
pub use scan::{scan, DiscoveredDevice};
pub use serial::{ParsedSerial, SerialNumber};
pub use session::{
    Outcome, Phase, PhaseRecord, ProvisioningReport, ProvisioningSession,
    ProvisioningStateMachine,
};
