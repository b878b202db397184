//! Background health-monitoring task.
//!
//! Spawns a thread that owns a capture handle and a telemetry sink, takes
//! one snapshot per zdok each cycle, and publishes the loading factor every
//! cycle and the accumulated amplitude histograms every
//! `hist_publish_every` cycles. Publish failures set a sticky flag but
//! never stop the loop.
//!
//! Safety: each `Monitor` spawns exactly one thread that is shut down when
//! the `Monitor` is stopped or dropped, preventing thread leaks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use adcmon_traits::{AdcDevice, Clock, HIST_BUCKETS, Histogram, Telemetry, Zdok};

use crate::snapshot::Capturer;
use crate::task::{TaskPhase, TaskState};

/// Loading factor in dB relative to full scale: -20*log10(128/rms), with the
/// rms taken around the mean. An empty capture has no defined loading.
pub fn loading_factor_db(sum: f64, sum_sq: f64, len: usize) -> f32 {
    if len == 0 {
        return f32::NAN;
    }
    let n = len as f64;
    let mean = sum / n;
    let var = sum_sq / n - mean * mean;
    (-20.0 * (128.0 / var.max(0.0).sqrt()).log10()) as f32
}

pub struct Monitor {
    state: Arc<TaskState>,
    publish_failed: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Monitor {
    pub fn spawn<D, T>(
        capturer: Capturer<D>,
        mut telemetry: T,
        clock: Arc<dyn Clock + Send + Sync>,
        period: Duration,
        hist_publish_every: u32,
    ) -> Self
    where
        D: AdcDevice + Send + 'static,
        T: Telemetry + Send + 'static,
    {
        let state = Arc::new(TaskState::new());
        state.set(TaskPhase::Running);
        let state_clone = Arc::clone(&state);
        let publish_failed = Arc::new(AtomicBool::new(false));
        let failed_clone = Arc::clone(&publish_failed);

        let join_handle = std::thread::spawn(move || {
            let mut hist: [Histogram; 2] = [[0u32; HIST_BUCKETS]; 2];
            let mut cycles = 0u32;

            loop {
                if state_clone.stop_requested() {
                    tracing::debug!("monitor thread received stop request");
                    break;
                }

                let mut loading = [f32::NAN; 2];
                for zdok in Zdok::ALL {
                    match capturer.capture(zdok) {
                        Ok(snap) => {
                            let mut sum = 0.0f64;
                            let mut sum_sq = 0.0f64;
                            for &s in snap.samples() {
                                let v = s as f64;
                                sum += v;
                                sum_sq += v * v;
                                hist[zdok.index()][(s as i16 + 128) as usize] += 1;
                            }
                            loading[zdok.index()] = loading_factor_db(sum, sum_sq, snap.len());
                        }
                        Err(e) => {
                            // Best-effort: this line reports NaN this cycle.
                            tracing::warn!(%zdok, error = %e, "monitor capture failed");
                        }
                    }
                }

                if let Err(e) = telemetry.publish_loading(loading) {
                    failed_clone.store(true, Ordering::Relaxed);
                    tracing::warn!(error = %e, "loading publish failed");
                }

                cycles += 1;
                if cycles % hist_publish_every == 0 {
                    if let Err(e) = telemetry.publish_histograms(&hist) {
                        failed_clone.store(true, Ordering::Relaxed);
                        tracing::warn!(error = %e, "histogram publish failed");
                    }
                    hist = [[0u32; HIST_BUCKETS]; 2];
                }

                if state_clone.stop_requested() {
                    break;
                }
                clock.sleep(period);
            }

            state_clone.set(TaskPhase::Stopped);
            tracing::trace!("monitor thread exiting cleanly");
        });

        Self {
            state,
            publish_failed,
            join_handle: Some(join_handle),
        }
    }

    /// Shared lifecycle state, for external observers.
    pub fn state(&self) -> Arc<TaskState> {
        Arc::clone(&self.state)
    }

    /// True once any telemetry publish has failed. Sticky.
    pub fn publish_failed(&self) -> bool {
        self.publish_failed.load(Ordering::Relaxed)
    }

    /// Request a stop and wait for the thread to finish its cycle.
    pub fn stop(&mut self) {
        self.state.request_stop();
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("monitor thread joined"),
                Err(e) => tracing::warn!(?e, "monitor thread panicked during shutdown"),
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_of_empty_capture_is_nan() {
        assert!(loading_factor_db(0.0, 0.0, 0).is_nan());
    }

    #[test]
    fn full_scale_square_wave_loads_at_zero_db() {
        // Alternating -128/+128-ish has rms ~128; use exactly +/-128.
        let n = 1000usize;
        let sum = 0.0;
        let sum_sq = (128.0f64 * 128.0) * n as f64;
        let db = loading_factor_db(sum, sum_sq, n);
        assert!(db.abs() < 1e-4);
    }

    #[test]
    fn dc_only_capture_has_unbounded_negative_loading() {
        // Constant input has zero variance.
        let n = 100usize;
        let sum = 100.0 * 5.0;
        let sum_sq = 100.0 * 25.0;
        assert_eq!(loading_factor_db(sum, sum_sq, n), f32::NEG_INFINITY);
    }
}
