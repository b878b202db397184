//! Telemetry sink backed by the tracing pipeline, with optional JSON lines
//! on stdout for machine consumers.

use adcmon_traits::{CommandReturn, DynError, Histogram, Telemetry};

#[derive(Clone)]
pub struct LogTelemetry {
    json: bool,
}

impl LogTelemetry {
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

impl Telemetry for LogTelemetry {
    fn publish_loading(&mut self, loading_db: [f32; 2]) -> Result<(), DynError> {
        tracing::info!(
            zdok0_db = loading_db[0],
            zdok1_db = loading_db[1],
            "loading factor"
        );
        if self.json {
            println!(
                "{}",
                serde_json::json!({
                    "event": "loading",
                    "zdok0_db": loading_db[0],
                    "zdok1_db": loading_db[1],
                })
            );
        }
        Ok(())
    }

    fn publish_histograms(&mut self, hist: &[Histogram; 2]) -> Result<(), DynError> {
        let totals: Vec<u64> = hist
            .iter()
            .map(|line| line.iter().map(|&c| c as u64).sum())
            .collect();
        tracing::info!(zdok0_samples = totals[0], zdok1_samples = totals[1], "histograms");
        if self.json {
            println!(
                "{}",
                serde_json::json!({
                    "event": "histograms",
                    "zdok0": hist[0].to_vec(),
                    "zdok1": hist[1].to_vec(),
                })
            );
        }
        Ok(())
    }

    fn publish_command_result(&mut self, rtn: CommandReturn) -> Result<(), DynError> {
        tracing::info!(
            status = rtn.status,
            failed_zdok = rtn.failed_zdok,
            snapshot_len = rtn.snapshot_len,
            "command result"
        );
        if self.json {
            println!(
                "{}",
                serde_json::json!({
                    "event": "command_result",
                    "status": rtn.status,
                    "failed_zdok": rtn.failed_zdok,
                    "snapshot_len": rtn.snapshot_len,
                })
            );
        }
        Ok(())
    }
}
