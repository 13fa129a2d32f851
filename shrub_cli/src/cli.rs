//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "shrub", version, about = "Flood-and-drain reservoir controller")]
pub struct Cli {
    /// Path to config TOML; built-in defaults when omitted
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Operator settings CSV (overrides persistence.settings_file)
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Probe calibration CSV (overrides persistence.calibration_file)
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Cycle state CSV (overrides persistence.state_file)
    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,

    /// Log and report as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Which probe calibration to discard.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ProbeKind {
    Ph,
    Ec,
    /// Both probes
    All,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the flood/drain and dosing controller
    Run {
        /// Stop after this many scheduler ticks
        #[arg(long, value_name = "N")]
        max_ticks: Option<u64>,
        /// Simulated time runs this many times faster than real time
        #[arg(long, value_name = "X")]
        accelerate: Option<f64>,
        /// Read UI events (USER_TOGGLE, TEST, VALVE_TOGGLE, PUMP_TOGGLE, RELOAD) from stdin
        #[arg(long, action = ArgAction::SetTrue)]
        stdin_events: bool,
    },
    /// Print the flood/drain phase table for the current settings
    Table,
    /// Sample every sensor once and print the status
    SelfCheck,
    /// Record a pH buffer reading (neutral 7.0 or acid 4.0)
    CalibratePh {
        /// Probe output in the buffer solution, millivolts
        #[arg(long, value_name = "MV")]
        mv: f64,
    },
    /// Record a conductivity buffer reading (1.413 or 12.88 mS/cm)
    CalibrateEc {
        /// Probe output in the buffer solution, millivolts
        #[arg(long, value_name = "MV")]
        mv: f64,
        /// Buffer temperature
        #[arg(long = "temp-c", value_name = "C", default_value_t = 25.0)]
        temp_c: f64,
    },
    /// Restore factory probe calibration and rewrite the calibration file
    CalibrateReset {
        #[arg(long, value_enum, default_value_t = ProbeKind::All)]
        probe: ProbeKind,
    },
}
