//! Battery / Charger Simulator
//!
//! Broadcasts the status of one simulated device on a SocketCAN interface
//! and applies the provisioning commands it hears.
//!
//! # Usage
//!
//! ```bash
//! ./serialprog-sim --interface vcan0 --class battery --serial 66
//! ```
//!
//! With config file:
//! ```bash
//! ./serialprog-sim --config config/battery-faulted.toml
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use serialprog_core::bus::socketcan::SocketCanBus;
use serialprog_core::config::SocketCanConfig;
use serialprog_core::{CanBus, DeviceClass};
use serialprog_sim::{SimConfig, SimulatedDevice};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(name = "serialprog-sim")]
#[command(about = "Battery and charger simulator for serial provisioning")]
struct Args {
    /// Configuration file path (TOML format)
    /// If provided, overrides command-line options
    #[arg(short, long)]
    config: Option<String>,

    /// CAN interface name
    #[arg(short, long, default_value = "vcan0")]
    interface: String,

    /// Device class: battery, charger
    #[arg(long, default_value = "battery")]
    class: DeviceClass,

    /// Initial serial number
    #[arg(short, long, default_value = "0")]
    serial: u32,

    /// Start with a latched critical fault
    #[arg(long)]
    critical_fault: bool,

    /// Error code to report until reset (repeatable)
    #[arg(long = "error-code", value_parser = parse_byte)]
    error_codes: Vec<u8>,

    /// Ignore program-serial commands
    #[arg(long)]
    ignore_program: bool,

    /// Status broadcast period in milliseconds
    #[arg(long, default_value = "100", value_parser = clap::value_parser!(u64).range(1..))]
    period_ms: u64,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose {
        "serialprog_sim=debug"
    } else {
        "serialprog_sim=info"
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        info!("Loading config from: {}", config_path);
        SimConfig::load(config_path).context("Failed to load config")?
    } else {
        // Build config from command-line args
        let mut config = SimConfig::default();
        config.interface = args.interface.clone();
        config.period_ms = args.period_ms;
        config.device.class = args.class;
        config.device.serial = args.serial;
        config.device.critical_fault = args.critical_fault;
        config.device.error_codes = args.error_codes.clone();
        config.device.adopt_serial = !args.ignore_program;
        config
    };

    let device = SimulatedDevice::from_config(&config.device);
    info!(
        interface = %config.interface,
        class = %device.class(),
        serial = %device.serial(),
        critical_fault = device.critical_fault(),
        "Starting device simulator"
    );

    let simulator = DeviceSimulator::new(config, device);

    info!("Simulator ready - press Ctrl+C to stop");
    simulator.run().await?;

    info!("Simulator stopped");
    Ok(())
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| format!("Invalid byte '{}': {}", s, e))
}

struct DeviceSimulator {
    config: SimConfig,
    device: Arc<Mutex<SimulatedDevice>>,
    running: Arc<AtomicBool>,
}

impl DeviceSimulator {
    fn new(config: SimConfig, device: SimulatedDevice) -> Self {
        Self {
            config,
            device: Arc::new(Mutex::new(device)),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    async fn run(&self) -> Result<()> {
        let socket_config = SocketCanConfig {
            interface: self.config.interface.clone(),
            ..Default::default()
        };

        // Separate sockets for broadcasting and listening
        let tx_bus = SocketCanBus::open(&socket_config)
            .with_context(|| format!("Failed to open {}", socket_config.interface))?;
        let rx_bus = SocketCanBus::open(&socket_config)
            .with_context(|| format!("Failed to open {}", socket_config.interface))?;

        // Start periodic status broadcast
        let device_for_periodic = self.device.clone();
        let running_for_periodic = self.running.clone();
        let period = Duration::from_millis(self.config.period_ms);
        let periodic_handle = tokio::spawn(async move {
            Self::periodic_task(tx_bus, device_for_periodic, running_for_periodic, period).await;
        });

        // Command listener
        let device_for_listener = self.device.clone();
        let running_for_listener = self.running.clone();
        let listener_handle: JoinHandle<Result<()>> = tokio::task::spawn_blocking(move || {
            Self::command_listener(rx_bus, device_for_listener, running_for_listener)
        });

        // Wait for Ctrl+C
        tokio::signal::ctrl_c().await?;
        info!("Shutting down...");

        self.running.store(false, Ordering::SeqCst);

        // Wait for tasks to finish
        let _ = tokio::time::timeout(Duration::from_secs(2), periodic_handle).await;
        let _ = tokio::time::timeout(Duration::from_secs(2), listener_handle).await;

        Ok(())
    }

    async fn periodic_task(
        mut bus: SocketCanBus,
        device: Arc<Mutex<SimulatedDevice>>,
        running: Arc<AtomicBool>,
        period: Duration,
    ) {
        let mut interval = tokio::time::interval(period);

        while running.load(Ordering::SeqCst) {
            interval.tick().await;

            let frame = match device.lock().status_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    error!(%e, "Failed to build status frame");
                    continue;
                }
            };

            if let Err(e) = bus.send(&frame) {
                debug!(%e, "Failed to send status frame");
            }
        }
    }

    fn command_listener(
        mut bus: SocketCanBus,
        device: Arc<Mutex<SimulatedDevice>>,
        running: Arc<AtomicBool>,
    ) -> Result<()> {
        info!(interface = bus.interface(), "Command listener started");

        while running.load(Ordering::SeqCst) {
            match bus.recv(Duration::from_millis(100)) {
                Ok(Some(frame)) => {
                    if let Some(command) = device.lock().handle_frame(&frame) {
                        info!(command = ?command, frame = %frame, "Applied command");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!(%e, "Socket read error");
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        }

        Ok(())
    }
}
