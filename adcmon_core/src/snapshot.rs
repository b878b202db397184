//! Snapshot capture from the per-zdok scope buffers.
//!
//! A capture is a two-phase trigger (arm, then start) on the line's control
//! register followed by polling the status register until the busy bit
//! clears. The status word's remaining bits are the snapshot length. All of
//! it happens under one process-wide lock shared by both zdoks, so the
//! monitor and dispatch tasks never drive the capture path concurrently.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use adcmon_traits::{AdcDevice, Clock, Zdok};
use eyre::WrapErr;

use crate::error::{AdcError, Report, Result};
use crate::map_hw_error_dyn;

/// Capture buffer size in samples; status-reported lengths are capped here.
pub const MAX_SNAPSHOT_LEN: usize = 16_384;

const CTRL_ARM: u32 = 2;
const CTRL_START: u32 = 3;
const STATUS_BUSY: u32 = 0x8000_0000;
const STATUS_LEN_MASK: u32 = 0x7fff_ffff;

/// One burst capture of raw interleaved samples from a single zdok.
#[derive(Debug, Clone)]
pub struct Snapshot {
    zdok: Zdok,
    data: Vec<i8>,
}

impl Snapshot {
    pub fn zdok(&self) -> Zdok {
        self.zdok
    }

    pub fn samples(&self) -> &[i8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Shared-lock capture path over the device handle.
///
/// Clones share the same lock; only one `capture` call (on either zdok) is
/// ever in flight at a time.
pub struct Capturer<D: AdcDevice> {
    dev: Arc<Mutex<D>>,
    clock: Arc<dyn Clock + Send + Sync>,
    poll_limit: u32,
    poll_interval: Duration,
}

impl<D: AdcDevice> Clone for Capturer<D> {
    fn clone(&self) -> Self {
        Self {
            dev: Arc::clone(&self.dev),
            clock: Arc::clone(&self.clock),
            poll_limit: self.poll_limit,
            poll_interval: self.poll_interval,
        }
    }
}

impl<D: AdcDevice> Capturer<D> {
    pub fn new(
        dev: Arc<Mutex<D>>,
        clock: Arc<dyn Clock + Send + Sync>,
        poll_limit: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            dev,
            clock,
            poll_limit,
            poll_interval,
        }
    }

    /// The shared device handle, for wiring a `RegisterIo` on the same lock.
    pub fn device(&self) -> Arc<Mutex<D>> {
        Arc::clone(&self.dev)
    }

    fn lock(&self) -> MutexGuard<'_, D> {
        self.dev.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Trigger a capture on `zdok` and copy the samples out.
    ///
    /// Fails with `CaptureTimeout` if the busy bit has not cleared after
    /// `poll_limit` status polls; the data buffer is not read in that case.
    pub fn capture(&self, zdok: Zdok) -> Result<Snapshot> {
        let mut dev = self.lock();

        dev.capture_ctrl(zdok, CTRL_ARM)
            .map_err(|e| Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("capture arm")?;
        dev.capture_ctrl(zdok, CTRL_START)
            .map_err(|e| Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("capture start")?;

        let mut polls = 0u32;
        let mut status = dev
            .capture_status(zdok)
            .map_err(|e| Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("capture status")?;
        while status & STATUS_BUSY != 0 {
            polls += 1;
            if polls > self.poll_limit {
                return Err(Report::new(AdcError::CaptureTimeout(self.poll_limit)));
            }
            self.clock.sleep(self.poll_interval);
            status = dev
                .capture_status(zdok)
                .map_err(|e| Report::new(map_hw_error_dyn(&*e)))
                .wrap_err("capture status")?;
        }

        let len = ((status & STATUS_LEN_MASK) as usize).min(MAX_SNAPSHOT_LEN);
        let data = dev
            .capture_data(zdok, len)
            .map_err(|e| Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("capture readout")?;
        tracing::trace!(%zdok, len, "snapshot captured");
        Ok(Snapshot { zdok, data })
    }
}
