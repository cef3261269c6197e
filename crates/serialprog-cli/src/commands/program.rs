//! Program command - write a serial number to one device

use anyhow::{Context, Result};
use serialprog_core::{
    create_bus, DeviceClass, ProvisionerConfig, ProvisioningStateMachine, SerialNumber,
};
use std::io::{BufRead, Write};
use tracing::warn;

use crate::output::OutputContext;

/// Run one provisioning session; returns whether it succeeded
pub async fn program(
    config: &ProvisionerConfig,
    class: DeviceClass,
    serial: Option<&str>,
    ctx: &OutputContext,
) -> Result<bool> {
    let input = match serial {
        Some(serial) => serial.to_string(),
        None => prompt_serial()?,
    };

    let parsed = SerialNumber::parse(&input)
        .with_context(|| format!("Invalid serial number '{}'", input.trim()))?;
    if parsed.truncated {
        warn!(raw = %parsed.raw, serial = %parsed.serial, "Serial number truncated to 20 bits");
        ctx.warn(&format!(
            "Serial number {} does not fit in 20 bits; programming {} instead",
            parsed.raw, parsed.serial
        ));
    }

    ctx.info(&format!("Programming {} with serial {}", class, parsed.serial));

    let config = config.clone();
    let report = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut bus = create_bus(&config.bus).context("Failed to open CAN bus")?;
        Ok(ProvisioningStateMachine::new(&mut bus, &config).run(class, parsed.serial))
    })
    .await
    .context("Provisioning task failed")??;

    ctx.print_report(&report);
    if let Some(residual) = report.residual_error() {
        ctx.warn(&format!("Warning: {}", residual));
    }

    Ok(report.is_success())
}

/// Read a serial number from stdin
fn prompt_serial() -> Result<String> {
    // Prompt on stderr so JSON output on stdout stays clean.
    eprint!("Enter serial number: ");
    std::io::stderr().flush().ok();

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read serial number")?;
    Ok(line)
}
