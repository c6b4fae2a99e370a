//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "puller", version, about = "Pillar puller rig controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/puller.toml")]
    pub config: PathBuf,

    /// Optional force calibration CSV (strict `raw,force` header); overrides [sensor]
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive the rig: commands on stdin, telemetry and reports on stdout.
    ///
    /// The load cell, stepper and driver are always simulated. With the
    /// `hardware` feature only the buttons and limit switch are real GPIO.
    Run {
        /// Stop after this many control cycles
        #[arg(long, value_name = "N")]
        max_cycles: Option<u64>,
        /// Exit once stdin is closed and the rig is idle
        #[arg(long, action = ArgAction::SetTrue)]
        until_idle: bool,
        /// Only print reports, not the per-cycle telemetry lines
        #[arg(long, action = ArgAction::SetTrue)]
        no_telemetry: bool,
    },
    /// Decode one command line without touching the rig
    Parse {
        /// The line as it would arrive on the serial port
        #[arg(allow_hyphen_values = true)]
        line: String,
    },
    /// Validate the config, bring up the simulated rig and home it
    SelfCheck,
}
