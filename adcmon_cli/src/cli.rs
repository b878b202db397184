//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "adcmon", version, about = "ADC calibration and monitoring CLI")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/adcmon.toml")]
    pub config: PathBuf,

    /// Print results as JSON lines instead of pretty text
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
    /// Run the service until interrupted
    Run {
        /// Start the health monitor immediately
        #[arg(long, action = ArgAction::SetTrue)]
        monitor: bool,
    },
    /// Capture a raw snapshot and dump it line by line
    Snapshot {
        /// Line selector: 0, 1 or 2 for both
        #[arg(long, default_value_t = 2)]
        zdok: i32,
    },
    /// Measure offsets/gains from noise and persist the record
    Measure {
        /// Line selector: 0, 1 or 2 for both
        #[arg(long, default_value_t = 2)]
        zdok: i32,
        /// Snapshots to average; 0 picks the default
        #[arg(long, default_value_t = 0)]
        repeat: i32,
    },
    /// Read (or load from file) the offset/gain/phase register bank
    Ogp {
        /// Line to address: 0 or 1
        #[arg(long, default_value_t = 0)]
        zdok: i32,
        /// Write the bank from a 12-line file instead of reading it
        #[arg(long, value_name = "FILE")]
        load: Option<PathBuf>,
    },
    /// Quick health check (device presence / sim ok)
    SelfCheck,
}
