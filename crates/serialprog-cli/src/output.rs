//! Output formatting for serialprog (text, json)

use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serialprog_core::{DiscoveredDevice, Outcome, PhaseRecord, ProvisioningReport};
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text and tables (default)
    Text,
    /// JSON format
    Json,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Text
    }
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print a success message (unless in quiet or JSON mode)
    pub fn success(&self, msg: &str) {
        if self.chatty() {
            println!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet or JSON mode)
    pub fn info(&self, msg: &str) {
        if self.chatty() {
            println!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    fn chatty(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }

    /// Print the result of a provisioning run
    pub fn print_report(&self, report: &ProvisioningReport) {
        match self.format {
            OutputFormat::Json => print_json(report),
            OutputFormat::Text => {
                if !self.quiet {
                    for (key, value) in report_summary(report) {
                        println!("{}: {}", key.bold(), value);
                    }
                    let rows: Vec<PhaseRow> = report.phases.iter().map(PhaseRow::from).collect();
                    if !rows.is_empty() {
                        println!("{}", Table::new(rows));
                    }
                }

                let verdict = format!("Result: {}", report.outcome);
                match &report.outcome {
                    Outcome::Succeeded {
                        residual_error_ok: Some(false),
                        ..
                    } => println!("{}", verdict.yellow()),
                    Outcome::Succeeded { .. } => println!("{}", verdict.green()),
                    Outcome::Failed { .. } => println!("{}", verdict.red()),
                }
            }
        }
    }

    /// Print devices found by a bus scan
    pub fn print_devices(&self, devices: &[DiscoveredDevice]) {
        match self.format {
            OutputFormat::Json => print_json(&devices),
            OutputFormat::Text => {
                if devices.is_empty() {
                    self.info("No devices found");
                } else {
                    let rows: Vec<DeviceRow> = devices.iter().map(DeviceRow::from).collect();
                    println!("{}", Table::new(rows));
                }
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(data: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Key/value lines describing a report
pub fn report_summary(report: &ProvisioningReport) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("Device", report.class.to_string()),
        ("Target serial", report.target.to_string()),
        (
            "Discovered serial",
            report
                .discovered
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
    ];

    if let Outcome::Succeeded {
        last_observation: Some(observation),
        ..
    } = &report.outcome
    {
        pairs.push((
            "Last status",
            format!(
                "status {}, error {}",
                format_byte(observation.status),
                format_byte(observation.error)
            ),
        ));
    }
    pairs
}

fn format_byte(value: Option<u8>) -> String {
    value
        .map(|b| format!("0x{:02X}", b))
        .unwrap_or_else(|| "-".to_string())
}

// =============================================================================
// Display types
// =============================================================================

/// Phase display for program command
#[derive(Debug, Tabled, Serialize, PartialEq)]
pub struct PhaseRow {
    #[tabled(rename = "Phase")]
    pub phase: String,
    #[tabled(rename = "Frames")]
    pub frames: usize,
    #[tabled(rename = "Elapsed (ms)")]
    pub elapsed_ms: u64,
}

impl From<&PhaseRecord> for PhaseRow {
    fn from(record: &PhaseRecord) -> Self {
        Self {
            phase: record.phase.to_string(),
            frames: record.frames_examined,
            elapsed_ms: record.elapsed_ms,
        }
    }
}

/// Device display for scan command
#[derive(Debug, Tabled, Serialize, PartialEq)]
pub struct DeviceRow {
    #[tabled(rename = "Class")]
    pub class: String,
    #[tabled(rename = "Serial")]
    pub serial: String,
    #[tabled(rename = "Frames")]
    pub frames: usize,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Error")]
    pub error: String,
}

impl From<&DiscoveredDevice> for DeviceRow {
    fn from(device: &DiscoveredDevice) -> Self {
        Self {
            class: device.class.to_string(),
            serial: device.serial.to_string(),
            frames: device.frames,
            status: format_byte(device.status),
            error: format_byte(device.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serialprog_core::{
        DeviceClass, Phase, ProvisioningError, SerialNumber, StatusFields,
    };

    fn succeeded_report() -> ProvisioningReport {
        ProvisioningReport {
            class: DeviceClass::Battery,
            target: SerialNumber::new(75),
            discovered: Some(SerialNumber::new(0x42)),
            outcome: Outcome::Succeeded {
                residual_error_ok: Some(true),
                last_observation: Some(StatusFields {
                    serial: SerialNumber::new(75),
                    status: Some(0x80),
                    error: Some(0x00),
                }),
            },
            phases: vec![PhaseRecord {
                phase: Phase::ResetConfirm,
                frames_examined: 40,
                elapsed_ms: 412,
            }],
        }
    }

    #[test]
    fn test_report_summary() {
        let summary = report_summary(&succeeded_report());
        assert_eq!(
            summary,
            vec![
                ("Device", "battery".to_string()),
                ("Target serial", "75 (0x0004B)".to_string()),
                ("Discovered serial", "66 (0x00042)".to_string()),
                ("Last status", "status 0x80, error 0x00".to_string()),
            ]
        );
    }

    #[test]
    fn test_phase_row() {
        let report = succeeded_report();
        let row = PhaseRow::from(&report.phases[0]);
        assert_eq!(
            row,
            PhaseRow {
                phase: "reset_confirm".to_string(),
                frames: 40,
                elapsed_ms: 412,
            }
        );
    }

    #[test]
    fn test_device_row_without_status_bytes() {
        let row = DeviceRow::from(&DiscoveredDevice {
            class: DeviceClass::Charger,
            serial: SerialNumber::new(7),
            frames: 3,
            status: None,
            error: None,
        });
        assert_eq!(row.class, "charger");
        assert_eq!(row.serial, "7 (0x00007)");
        assert_eq!(row.status, "-");
        assert_eq!(row.error, "-");
    }

    #[test]
    fn test_failed_report_json_shape() {
        let report = ProvisioningReport {
            class: DeviceClass::Charger,
            target: SerialNumber::new(75),
            discovered: None,
            outcome: Outcome::Failed {
                reason: ProvisioningError::DeviceNotFound,
            },
            phases: Vec::new(),
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["class"], "charger");
        assert_eq!(value["target"], 75);
        assert_eq!(value["outcome"]["result"], "failed");
        assert_eq!(value["outcome"]["reason"]["code"], "device_not_found");
    }

    #[test]
    fn test_output_format_parses_from_config() {
        #[derive(Deserialize)]
        struct Wrapper {
            output: OutputFormat,
        }
        let wrapper: Wrapper = toml::from_str(r#"output = "json""#).unwrap();
        assert_eq!(wrapper.output, OutputFormat::Json);
    }
}
