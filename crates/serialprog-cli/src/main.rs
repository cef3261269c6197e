//! serialprog - Battery and charger serial number provisioning over CAN
//!
//! Discovers a device on the bus, programs a new serial number into it and
//! confirms the device adopted it.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serialprog_core::DeviceClass;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "serialprog")]
#[command(author, version, about = "CAN serial number provisioning tool")]
#[command(propagate_version = true)]
struct Cli {
    /// CAN interface (overrides the config file)
    #[arg(short, long, env = "SERIALPROG_INTERFACE")]
    interface: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "SERIALPROG_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Program a serial number into a battery or charger
    Program {
        /// Device class: battery, charger
        class: DeviceClass,

        /// Serial number to program (prompted for when omitted)
        #[arg(short, long, allow_hyphen_values = true)]
        serial: Option<String>,
    },

    /// List batteries and chargers broadcasting on the bus
    Scan {
        /// Listening window in milliseconds
        #[arg(long, default_value = "2000")]
        window_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(cli.interface.as_deref(), cli.output, cli.no_color);

    // Create output context
    let ctx = OutputContext::new(merged.output, merged.no_color, cli.quiet);

    // Execute command
    match &cli.command {
        Commands::Program { class, serial } => {
            let succeeded =
                commands::program(&merged.provisioner, *class, serial.as_deref(), &ctx).await?;
            if !succeeded {
                ctx.error("Provisioning failed");
                return Ok(ExitCode::FAILURE);
            }
            ctx.success("Provisioning complete");
        }

        Commands::Scan { window_ms } => {
            commands::scan(&merged.provisioner, *window_ms, &ctx).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_program_args() {
        let cli = Cli::parse_from([
            "serialprog",
            "--interface",
            "vcan0",
            "program",
            "Battery",
            "--serial",
            "75",
        ]);
        assert_eq!(cli.interface.as_deref(), Some("vcan0"));
        match cli.command {
            Commands::Program { class, serial } => {
                assert_eq!(class, DeviceClass::Battery);
                assert_eq!(serial.as_deref(), Some("75"));
            }
            Commands::Scan { .. } => panic!("Expected program command"),
        }
    }

    #[test]
    fn test_scan_default_window() {
        let cli = Cli::parse_from(["serialprog", "-o", "json", "scan"]);
        assert_eq!(cli.output, Some(OutputFormat::Json));
        assert!(matches!(cli.command, Commands::Scan { window_ms: 2000 }));
    }

    #[test]
    fn test_unknown_class_rejected() {
        assert!(Cli::try_parse_from(["serialprog", "program", "inverter"]).is_err());
    }
}
