//! Scan command - list devices broadcasting on the bus

use anyhow::{Context, Result};
use serialprog_core::{create_bus, ProvisionerConfig};
use std::time::Duration;

use crate::output::OutputContext;

/// Listen passively for `window_ms` and print every device heard
pub async fn scan(config: &ProvisionerConfig, window_ms: u64, ctx: &OutputContext) -> Result<()> {
    ctx.info(&format!("Listening for {} ms...", window_ms));

    let config = config.clone();
    let devices = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut bus = create_bus(&config.bus).context("Failed to open CAN bus")?;
        serialprog_core::scan(
            &mut bus,
            Duration::from_millis(window_ms),
            config.receive_timeout(),
        )
        .context("Bus scan failed")
    })
    .await
    .context("Scan task failed")??;

    ctx.print_devices(&devices);
    Ok(())
}
