#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the ADC monitor service.
//!
//! All sections are deserialized from TOML with defaults that match the
//! reference deployment (1 ms SPI settle, 100 capture polls, 1 s monitor
//! cycle, histogram publish every 60 cycles) and validated before use.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

/// Hardware timing knobs for the register interface and snapshot capture.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Timing {
    /// Settle delay after each SPI request word (us).
    pub spi_settle_us: u64,
    /// Maximum status polls before a capture is declared timed out.
    pub poll_limit: u32,
    /// Delay between capture status polls (us). 0 means busy-poll.
    pub poll_interval_us: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            spi_settle_us: 1_000,
            poll_limit: 100,
            poll_interval_us: 100,
        }
    }
}

/// Monitor-loop pacing and publish cadence.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorCfg {
    /// Sleep between monitor cycles (ms).
    pub period_ms: u64,
    /// Publish and reset the histograms every this many cycles.
    pub hist_publish_every: u32,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            period_ms: 1_000,
            hist_publish_every: 60,
        }
    }
}

/// Command dispatch pacing.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DispatchCfg {
    /// Fixed gap applied after each processed command (ms).
    pub cmd_gap_ms: u64,
    /// Bounded depth of the command queue.
    pub queue_depth: usize,
}

impl Default for DispatchCfg {
    fn default() -> Self {
        Self {
            cmd_gap_ms: 1_000,
            queue_depth: 8,
        }
    }
}

/// Raw snapshot dump destination.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SnapshotCfg {
    /// Line-delimited sample dump, overwritten on every TakeSnapshot.
    pub dump_path: String,
}

impl Default for SnapshotCfg {
    fn default() -> Self {
        Self {
            dump_path: "adc_snapshot.txt".to_string(),
        }
    }
}

/// Calibration record persistence.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Plain-text record file, one value per line.
    pub file: String,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            file: "adc_cal.txt".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Mapped-device description; ignored by the simulated backend.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Hardware {
    /// Path of the device window to map.
    pub map_path: Option<String>,
    /// Register name -> byte offset inside the window.
    pub registers: BTreeMap<String, usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub timing: Timing,
    pub monitor: MonitorCfg,
    pub dispatch: DispatchCfg,
    pub snapshot: SnapshotCfg,
    pub calibration: CalibrationCfg,
    pub logging: Logging,
    pub hardware: Hardware,
}

impl Config {
    /// Reject values that would stall or spin the background tasks.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.timing.poll_limit == 0 {
            eyre::bail!("timing.poll_limit must be >= 1");
        }
        if self.monitor.period_ms == 0 {
            eyre::bail!("monitor.period_ms must be >= 1");
        }
        if self.monitor.hist_publish_every == 0 {
            eyre::bail!("monitor.hist_publish_every must be >= 1");
        }
        if self.dispatch.queue_depth == 0 {
            eyre::bail!("dispatch.queue_depth must be >= 1");
        }
        if self.snapshot.dump_path.is_empty() {
            eyre::bail!("snapshot.dump_path must not be empty");
        }
        if self.calibration.file.is_empty() {
            eyre::bail!("calibration.file must not be empty");
        }
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }
        Ok(())
    }
}

/// Parse and validate a TOML config document.
pub fn from_str(text: &str) -> eyre::Result<Config> {
    let cfg: Config = toml::from_str(text).map_err(|e| eyre::eyre!("config parse: {e}"))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load and validate a config file.
pub fn load(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("reading {}: {e}", path.display()))?;
    from_str(&text)
}
