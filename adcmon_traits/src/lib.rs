//! Seam traits and shared types for the ADC calibration/monitoring stack.
//!
//! Everything that crosses a crate boundary lives here: the hardware device
//! trait, the calibration persistence trait, the telemetry sink trait, and
//! the small plain-data types they exchange. This crate is dependency-free
//! on purpose so that mocks and real backends are equally cheap to write.

pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Boxed error type used at the trait seams, matching `std::error::Error`
/// so backends can surface their own typed errors for downcasting.
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Number of interleaved conversion cores per input line.
pub const NUM_CORES: usize = 4;

/// Number of amplitude-histogram buckets (one per signed 8-bit code).
pub const HIST_BUCKETS: usize = 256;

/// Per-line amplitude histogram, indexed by `code + 128`.
pub type Histogram = [u32; HIST_BUCKETS];

/// One of the two independent ADC input/capture lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zdok {
    Zero,
    One,
}

impl Zdok {
    /// Both lines, in capture order.
    pub const ALL: [Zdok; 2] = [Zdok::Zero, Zdok::One];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Zdok::Zero => 0,
            Zdok::One => 1,
        }
    }

    pub fn from_index(i: usize) -> Option<Zdok> {
        match i {
            0 => Some(Zdok::Zero),
            1 => Some(Zdok::One),
            _ => None,
        }
    }
}

impl std::fmt::Display for Zdok {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "zdok{}", self.index())
    }
}

/// Persistent calibration record: per line x core offset (physical units),
/// gain (percent deviation) and overload sample count, plus per-line
/// aggregate average-zero and average-amplitude.
///
/// The whole record is the unit of persistence; a write always carries both
/// lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalRecord {
    pub offs: [[f32; NUM_CORES]; 2],
    pub gains: [[f32; NUM_CORES]; 2],
    pub overload: [[i32; NUM_CORES]; 2],
    pub avz: [f32; 2],
    pub avamp: [f32; 2],
}

/// Fixed-width result tuple published after every processed command.
///
/// `failed_zdok` is -1 unless a per-line operation failed, in which case it
/// names the line the iteration stopped on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandReturn {
    pub status: i32,
    pub failed_zdok: i32,
    pub snapshot_len: i32,
}

impl Default for CommandReturn {
    fn default() -> Self {
        Self {
            status: 0,
            failed_zdok: -1,
            snapshot_len: 0,
        }
    }
}

/// Access to the mapped ADC register space: one 32-bit SPI word per zdok
/// plus per-zdok capture control/status registers and data buffers.
///
/// Implementations must be bounds-checked; an out-of-range access is a
/// backend error, never UB. All methods take `&mut self` because even reads
/// go through a request/response handshake on real hardware.
pub trait AdcDevice {
    /// Write one request word to the SPI controller word for `zdok`.
    fn spi_write(&mut self, zdok: Zdok, word: u32) -> Result<(), DynError>;

    /// Read back the SPI controller response word for `zdok`.
    fn spi_read(&mut self, zdok: Zdok) -> Result<u32, DynError>;

    /// Write the capture control register for `zdok`.
    fn capture_ctrl(&mut self, zdok: Zdok, value: u32) -> Result<(), DynError>;

    /// Read the capture status register for `zdok`.
    fn capture_status(&mut self, zdok: Zdok) -> Result<u32, DynError>;

    /// Copy `len` captured samples out of the `zdok` capture buffer.
    fn capture_data(&mut self, zdok: Zdok, len: usize) -> Result<Vec<i8>, DynError>;
}

// Forwarding impl so callers can pick a backend at runtime.
impl<T: AdcDevice + ?Sized> AdcDevice for Box<T> {
    fn spi_write(&mut self, zdok: Zdok, word: u32) -> Result<(), DynError> {
        (**self).spi_write(zdok, word)
    }

    fn spi_read(&mut self, zdok: Zdok) -> Result<u32, DynError> {
        (**self).spi_read(zdok)
    }

    fn capture_ctrl(&mut self, zdok: Zdok, value: u32) -> Result<(), DynError> {
        (**self).capture_ctrl(zdok, value)
    }

    fn capture_status(&mut self, zdok: Zdok) -> Result<u32, DynError> {
        (**self).capture_status(zdok)
    }

    fn capture_data(&mut self, zdok: Zdok, len: usize) -> Result<Vec<i8>, DynError> {
        (**self).capture_data(zdok, len)
    }
}

/// Persistent storage for the calibration record (external key/value store,
/// a file, or an in-memory mock).
pub trait CalStore {
    fn load(&mut self) -> Result<CalRecord, DynError>;
    fn store(&mut self, record: &CalRecord) -> Result<(), DynError>;
}

/// Sink for monitoring results and command result records.
///
/// Implementations are expected to be cheap to clone (share their backend)
/// so the monitor and dispatch tasks can publish independently.
pub trait Telemetry {
    /// Per-cycle loading factors in dB relative to full scale, one per zdok.
    fn publish_loading(&mut self, loading_db: [f32; 2]) -> Result<(), DynError>;

    /// Accumulated amplitude histograms, one per zdok.
    fn publish_histograms(&mut self, hist: &[Histogram; 2]) -> Result<(), DynError>;

    /// Result record for a processed command, published even on failure.
    fn publish_command_result(&mut self, rtn: CommandReturn) -> Result<(), DynError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zdok_index_roundtrip() {
        for z in Zdok::ALL {
            assert_eq!(Zdok::from_index(z.index()), Some(z));
        }
        assert_eq!(Zdok::from_index(2), None);
    }

    #[test]
    fn command_return_defaults_to_no_failed_line() {
        let rtn = CommandReturn::default();
        assert_eq!(rtn.status, 0);
        assert_eq!(rtn.failed_zdok, -1);
    }
}
