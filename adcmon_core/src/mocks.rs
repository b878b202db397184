//! Test and helper mocks for adcmon_core.

use std::sync::{Arc, Mutex, PoisonError};

use adcmon_traits::{
    AdcDevice, CalRecord, CalStore, CommandReturn, DynError, Histogram, Telemetry, Zdok,
};

/// In-memory ADC with a programmable register file and capture buffers.
///
/// Captures replay the per-zdok `snapshot` vector; `busy_polls` controls how
/// many status reads report busy after a start before the length appears
/// (`u32::MAX` means the busy bit never clears).
pub struct MockAdc {
    regs: [[u16; 128]; 2],
    pending: [Option<u8>; 2],
    pub snapshot: [Vec<i8>; 2],
    pub busy_polls: [u32; 2],
    status_reads: [u32; 2],
    pub ctrl_writes: Vec<(Zdok, u32)>,
    pub data_reads: u32,
    /// Corrupt the echoed address on every SPI response.
    pub mismatch_echo: bool,
    pub fail_spi: bool,
}

impl Default for MockAdc {
    fn default() -> Self {
        Self {
            regs: [[0; 128]; 2],
            pending: [None; 2],
            snapshot: [Vec::new(), Vec::new()],
            busy_polls: [0, 0],
            status_reads: [0, 0],
            ctrl_writes: Vec::new(),
            data_reads: 0,
            mismatch_echo: false,
            fail_spi: false,
        }
    }
}

impl MockAdc {
    pub fn with_snapshot(samples: Vec<i8>) -> Self {
        Self {
            snapshot: [samples.clone(), samples],
            ..Self::default()
        }
    }

    pub fn register(&self, zdok: Zdok, addr: u8) -> u16 {
        self.regs[zdok.index()][(addr & 0x7f) as usize]
    }

    pub fn set_register(&mut self, zdok: Zdok, addr: u8, value: u16) {
        self.regs[zdok.index()][(addr & 0x7f) as usize] = value;
    }
}

impl AdcDevice for MockAdc {
    fn spi_write(&mut self, zdok: Zdok, word: u32) -> Result<(), DynError> {
        if self.fail_spi {
            return Err(Box::new(std::io::Error::other("spi write refused")));
        }
        let z = zdok.index();
        let addr = ((word >> 8) & 0xff) as u8;
        let payload = (word >> 16) as u16;
        if addr & 0x80 != 0 {
            self.regs[z][(addr & 0x7f) as usize] = payload;
            self.pending[z] = None;
        } else {
            self.pending[z] = Some(addr);
        }
        Ok(())
    }

    fn spi_read(&mut self, zdok: Zdok) -> Result<u32, DynError> {
        if self.fail_spi {
            return Err(Box::new(std::io::Error::other("spi read refused")));
        }
        let z = zdok.index();
        let addr = self.pending[z].unwrap_or(0);
        let value = self.regs[z][(addr & 0x7f) as usize];
        let echo = if self.mismatch_echo { addr ^ 0x55 } else { addr };
        Ok(((value as u32) << 16) | ((echo as u32) << 8) | 1)
    }

    fn capture_ctrl(&mut self, zdok: Zdok, value: u32) -> Result<(), DynError> {
        self.ctrl_writes.push((zdok, value));
        // A start begins a fresh busy window.
        if value == 3 {
            self.status_reads[zdok.index()] = 0;
        }
        Ok(())
    }

    fn capture_status(&mut self, zdok: Zdok) -> Result<u32, DynError> {
        let z = zdok.index();
        let len = self.snapshot[z].len() as u32;
        if self.status_reads[z] < self.busy_polls[z] {
            self.status_reads[z] += 1;
            Ok(0x8000_0000 | len)
        } else {
            Ok(len)
        }
    }

    fn capture_data(&mut self, zdok: Zdok, len: usize) -> Result<Vec<i8>, DynError> {
        self.data_reads += 1;
        let buf = &self.snapshot[zdok.index()];
        Ok(buf[..len.min(buf.len())].to_vec())
    }
}

/// In-memory calibration store with injectable failures.
#[derive(Default)]
pub struct MemStore {
    pub record: Option<CalRecord>,
    pub fail_load: bool,
    pub fail_store: bool,
    pub stores: u32,
}

impl MemStore {
    pub fn seed(&mut self, record: CalRecord) {
        self.record = Some(record);
    }
}

impl CalStore for MemStore {
    fn load(&mut self) -> Result<CalRecord, DynError> {
        if self.fail_load {
            return Err(Box::new(std::io::Error::other("store unavailable")));
        }
        Ok(self.record.clone().unwrap_or_default())
    }

    fn store(&mut self, record: &CalRecord) -> Result<(), DynError> {
        if self.fail_store {
            return Err(Box::new(std::io::Error::other("store write refused")));
        }
        self.stores += 1;
        self.record = Some(record.clone());
        Ok(())
    }
}

/// Everything a `VecTelemetry` has recorded, in publish order.
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    Loading([f32; 2]),
    Histograms(Box<[Histogram; 2]>),
    CommandResult(CommandReturn),
}

#[derive(Default)]
struct VecTelemetryInner {
    events: Vec<TelemetryEvent>,
    fail_loading: bool,
    fail_histograms: bool,
}

/// Shared recording telemetry sink; clones share the same event log.
#[derive(Clone, Default)]
pub struct VecTelemetry {
    inner: Arc<Mutex<VecTelemetryInner>>,
}

impl VecTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecTelemetryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.lock().events.clone()
    }

    pub fn command_results(&self) -> Vec<CommandReturn> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                TelemetryEvent::CommandResult(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    pub fn loading_count(&self) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| matches!(e, TelemetryEvent::Loading(_)))
            .count()
    }

    pub fn histogram_count(&self) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| matches!(e, TelemetryEvent::Histograms(_)))
            .count()
    }

    pub fn set_fail_loading(&self, fail: bool) {
        self.lock().fail_loading = fail;
    }

    pub fn set_fail_histograms(&self, fail: bool) {
        self.lock().fail_histograms = fail;
    }
}

impl Telemetry for VecTelemetry {
    fn publish_loading(&mut self, loading_db: [f32; 2]) -> Result<(), DynError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.fail_loading {
            return Err(Box::new(std::io::Error::other("loading sink down")));
        }
        inner.events.push(TelemetryEvent::Loading(loading_db));
        Ok(())
    }

    fn publish_histograms(&mut self, hist: &[Histogram; 2]) -> Result<(), DynError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.fail_histograms {
            return Err(Box::new(std::io::Error::other("histogram sink down")));
        }
        inner
            .events
            .push(TelemetryEvent::Histograms(Box::new(*hist)));
        Ok(())
    }

    fn publish_command_result(&mut self, rtn: CommandReturn) -> Result<(), DynError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.events.push(TelemetryEvent::CommandResult(rtn));
        Ok(())
    }
}
