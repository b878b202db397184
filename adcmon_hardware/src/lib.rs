//! Device backends for the ADC monitor stack.
//!
//! `SimulatedAdc` is the default backend: a deterministic noise source with
//! a faithful SPI request/response handshake, used by the CLI and for
//! development without a mapped FPGA. The real memory-mapped backend lives
//! in `mapped` behind the `hardware` feature.
pub mod error;
#[cfg(feature = "hardware")]
pub mod mapped;

use adcmon_traits::{AdcDevice, DynError, Zdok};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Capture buffer size in samples for each zdok. Snapshot lengths reported
/// by the status register never exceed this.
pub const SNAP_BUF_LEN: usize = 16_384;

const STATUS_BUSY: u32 = 0x8000_0000;
const CTRL_START: u32 = 3;
const SPI_WRITE_FLAG: u8 = 0x80;

/// Simulated ADC: noise-like capture data plus an SPI register file that
/// echoes requests the way the 5 GSa controller does.
///
/// Each capture start regenerates the buffer from the seeded RNG, so runs
/// are reproducible. Per-position DC bias can be injected to give the
/// calibration estimator something to measure.
pub struct SimulatedAdc {
    rng: StdRng,
    snap: [Vec<i8>; 2],
    /// DC bias added per interleave position (capture order), per zdok.
    bias: [[i32; 4]; 2],
    regs: [[u16; 128]; 2],
    pending_read: [Option<u8>; 2],
    busy_reads: [u32; 2],
}

impl SimulatedAdc {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            snap: [Vec::new(), Vec::new()],
            bias: [[0; 4]; 2],
            regs: [[0; 128]; 2],
            pending_read: [None; 2],
            busy_reads: [0; 2],
        }
    }

    /// Inject a DC bias (in codes) per interleave position for `zdok`.
    pub fn with_bias(mut self, zdok: Zdok, bias: [i32; 4]) -> Self {
        self.bias[zdok.index()] = bias;
        self
    }

    fn fill_noise(&mut self, zdok: Zdok) {
        let zi = zdok.index();
        let bias = self.bias[zi];
        let buf = &mut self.snap[zi];
        buf.clear();
        for i in 0..SNAP_BUF_LEN {
            // Sum of four uniforms approximates a noise-like input with an
            // rms of roughly 28 codes, well inside the 8-bit range.
            let mut v: i32 = (0..4).map(|_| self.rng.gen_range(-24i32..=24)).sum();
            v += bias[i % 4];
            buf.push(v.clamp(i8::MIN as i32, i8::MAX as i32) as i8);
        }
    }
}

impl AdcDevice for SimulatedAdc {
    fn spi_write(&mut self, zdok: Zdok, word: u32) -> Result<(), DynError> {
        let zi = zdok.index();
        let addr = ((word >> 8) & 0xff) as u8;
        let payload = (word >> 16) as u16;
        if addr & SPI_WRITE_FLAG != 0 {
            self.regs[zi][(addr & 0x7f) as usize] = payload;
            self.pending_read[zi] = None;
        } else {
            self.pending_read[zi] = Some(addr & 0x7f);
        }
        Ok(())
    }

    fn spi_read(&mut self, zdok: Zdok) -> Result<u32, DynError> {
        let zi = zdok.index();
        Ok(match self.pending_read[zi] {
            Some(addr) => {
                let value = self.regs[zi][addr as usize];
                ((value as u32) << 16) | ((addr as u32) << 8)
            }
            None => 0,
        })
    }

    fn capture_ctrl(&mut self, zdok: Zdok, value: u32) -> Result<(), DynError> {
        if value == CTRL_START {
            self.fill_noise(zdok);
            // Report busy for one status poll before the data is "ready".
            self.busy_reads[zdok.index()] = 1;
            tracing::trace!(%zdok, "simulated capture started");
        }
        Ok(())
    }

    fn capture_status(&mut self, zdok: Zdok) -> Result<u32, DynError> {
        let zi = zdok.index();
        if self.busy_reads[zi] > 0 {
            self.busy_reads[zi] -= 1;
            return Ok(STATUS_BUSY);
        }
        Ok(self.snap[zi].len() as u32)
    }

    fn capture_data(&mut self, zdok: Zdok, len: usize) -> Result<Vec<i8>, DynError> {
        let buf = &self.snap[zdok.index()];
        let len = len.min(buf.len());
        Ok(buf[..len].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(dev: &mut SimulatedAdc, zdok: Zdok) -> Vec<i8> {
        dev.capture_ctrl(zdok, 2).unwrap();
        dev.capture_ctrl(zdok, 3).unwrap();
        let mut status = dev.capture_status(zdok).unwrap();
        while status & STATUS_BUSY != 0 {
            status = dev.capture_status(zdok).unwrap();
        }
        dev.capture_data(zdok, status as usize).unwrap()
    }

    #[test]
    fn capture_is_full_length_and_seeded() {
        let mut a = SimulatedAdc::new(7);
        let mut b = SimulatedAdc::new(7);
        let sa = capture(&mut a, Zdok::Zero);
        let sb = capture(&mut b, Zdok::Zero);
        assert_eq!(sa.len(), SNAP_BUF_LEN);
        assert_eq!(sa, sb);
    }

    #[test]
    fn status_reports_busy_once_after_start() {
        let mut dev = SimulatedAdc::new(1);
        dev.capture_ctrl(Zdok::One, 2).unwrap();
        dev.capture_ctrl(Zdok::One, 3).unwrap();
        assert_ne!(dev.capture_status(Zdok::One).unwrap() & STATUS_BUSY, 0);
        assert_eq!(
            dev.capture_status(Zdok::One).unwrap(),
            SNAP_BUF_LEN as u32
        );
    }

    #[test]
    fn spi_register_file_echoes_request_address() {
        let mut dev = SimulatedAdc::new(0);
        // Write 0x00ab to register 0x20 on zdok 0.
        dev.spi_write(Zdok::Zero, (0x00ab << 16) | ((0x20 | 0x80) << 8) | 1)
            .unwrap();
        // Request a read of the same register.
        dev.spi_write(Zdok::Zero, (0x20 << 8) | 1).unwrap();
        let word = dev.spi_read(Zdok::Zero).unwrap();
        assert_eq!((word >> 8) & 0xff, 0x20);
        assert_eq!((word >> 16) as u16, 0x00ab);
    }

    #[test]
    fn zdok_register_files_are_independent() {
        let mut dev = SimulatedAdc::new(0);
        dev.spi_write(Zdok::Zero, (5u32 << 16) | ((0x0f | 0x80) << 8) | 1)
            .unwrap();
        dev.spi_write(Zdok::One, (0x0f << 8) | 1).unwrap();
        let word = dev.spi_read(Zdok::One).unwrap();
        assert_eq!((word >> 16) as u16, 0);
    }
}
