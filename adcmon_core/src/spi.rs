//! Register interface to the ADC's SPI controller.
//!
//! Every access is a request word written to the shared controller word for
//! the target zdok, a fixed settle delay, and (for reads) a response word
//! read back. The response echoes the requested register address; a
//! different echo means bus contention or a wrong target and surfaces as
//! `AdcError::RegisterMismatch`.
//!
//! Word layout, big-endian on the wire:
//!   bits 31..16  16-bit payload
//!   bits 15..8   register address (0x80 set for writes)
//!   bits  7..0   strobe (always 1 in requests)

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use adcmon_traits::{AdcDevice, Clock, Zdok};
use eyre::WrapErr;

use crate::error::{AdcError, Report, Result};
use crate::map_hw_error_dyn;

/// Addressable configuration registers of the ADC controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegAddr {
    Control,
    ChanSel,
    ExtOffset,
    ExtGain,
    ExtPhase,
    CalCtrl,
    /// Base of the per-channel nonlinearity table.
    ExtInlBase,
}

impl RegAddr {
    pub fn code(self) -> u8 {
        match self {
            RegAddr::Control => 0x01,
            RegAddr::ChanSel => 0x0f,
            RegAddr::ExtOffset => 0x20,
            RegAddr::ExtGain => 0x22,
            RegAddr::ExtPhase => 0x24,
            RegAddr::CalCtrl => 0x10,
            RegAddr::ExtInlBase => 0x30,
        }
    }
}

/// One of the four conversion cores, in logical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Core {
    A,
    B,
    C,
    D,
}

impl Core {
    pub const ALL: [Core; 4] = [Core::A, Core::B, Core::C, Core::D];

    /// Channel-select code: cores are addressed 1..=4 on the controller.
    fn chansel(self) -> u16 {
        match self {
            Core::A => 1,
            Core::B => 2,
            Core::C => 3,
            Core::D => 4,
        }
    }
}

const SPI_WRITE_FLAG: u8 = 0x80;
const SPI_STROBE: u32 = 0x01;

/// Full-scale physical ranges for the affine register encodings.
pub const OFFSET_RANGE: f32 = 100.0;
pub const GAIN_RANGE: f32 = 36.0;
pub const PHASE_RANGE: f32 = 28.0;

// Calibration-apply strobe values naming which sub-register changed.
const CAL_APPLY_OFFSET: u16 = 2 << 2;
const CAL_APPLY_GAIN: u16 = 2 << 4;
const CAL_APPLY_PHASE: u16 = 2 << 6;

pub(crate) fn request_word(addr: RegAddr, payload: u16, write: bool) -> u32 {
    let a = addr.code() | if write { SPI_WRITE_FLAG } else { 0 };
    ((payload as u32) << 16) | ((a as u32) << 8) | SPI_STROBE
}

pub(crate) fn response_fields(word: u32) -> (u8, u16) {
    (((word >> 8) & 0xff) as u8, (word >> 16) as u16)
}

/// code = round(phys * 255/range) + 128, clamped to the 8-bit code width.
/// One code step is range/255 of physical units.
pub(crate) fn encode_affine(phys: f32, range: f32) -> u16 {
    let code = (phys * (255.0 / range)).round() as i32 + 0x80;
    code.clamp(0, 255) as u16
}

pub(crate) fn decode_affine(code: u16, range: f32) -> f32 {
    ((code as i32 - 0x80) as f32) * (range / 255.0)
}

/// Typed register access over a shared device handle.
pub struct RegisterIo<D: AdcDevice> {
    dev: Arc<Mutex<D>>,
    clock: Arc<dyn Clock + Send + Sync>,
    settle: Duration,
}

impl<D: AdcDevice> Clone for RegisterIo<D> {
    fn clone(&self) -> Self {
        Self {
            dev: Arc::clone(&self.dev),
            clock: Arc::clone(&self.clock),
            settle: self.settle,
        }
    }
}

impl<D: AdcDevice> RegisterIo<D> {
    pub fn new(
        dev: Arc<Mutex<D>>,
        clock: Arc<dyn Clock + Send + Sync>,
        settle: Duration,
    ) -> Self {
        Self { dev, clock, settle }
    }

    fn lock(&self) -> MutexGuard<'_, D> {
        self.dev.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read one 16-bit register value; fails with `RegisterMismatch` when
    /// the response echoes a different address than requested.
    pub fn read_register(&self, zdok: Zdok, addr: RegAddr) -> Result<u16> {
        let mut dev = self.lock();
        dev.spi_write(zdok, request_word(addr, 0, false))
            .map_err(|e| Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("spi read request")?;
        // The controller needs the settle delay to complete the request.
        self.clock.sleep(self.settle);
        let word = dev
            .spi_read(zdok)
            .map_err(|e| Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("spi read response")?;
        let (echo, value) = response_fields(word);
        if echo != addr.code() {
            return Err(Report::new(AdcError::RegisterMismatch));
        }
        Ok(value)
    }

    /// Write one 16-bit register value. No readback; the settle delay keeps
    /// this command from colliding with the next one.
    pub fn write_register(&self, zdok: Zdok, addr: RegAddr, value: u16) -> Result<()> {
        let mut dev = self.lock();
        dev.spi_write(zdok, request_word(addr, value, true))
            .map_err(|e| Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("spi write request")?;
        self.clock.sleep(self.settle);
        Ok(())
    }

    pub fn offset(&self, zdok: Zdok, core: Core) -> Result<f32> {
        self.write_register(zdok, RegAddr::ChanSel, core.chansel())?;
        let code = self.read_register(zdok, RegAddr::ExtOffset)?;
        Ok(decode_affine(code, OFFSET_RANGE))
    }

    pub fn set_offset(&self, zdok: Zdok, core: Core, value: f32) -> Result<()> {
        self.write_register(zdok, RegAddr::ChanSel, core.chansel())?;
        self.write_register(zdok, RegAddr::ExtOffset, encode_affine(value, OFFSET_RANGE))?;
        self.write_register(zdok, RegAddr::CalCtrl, CAL_APPLY_OFFSET)
    }

    pub fn gain(&self, zdok: Zdok, core: Core) -> Result<f32> {
        self.write_register(zdok, RegAddr::ChanSel, core.chansel())?;
        let code = self.read_register(zdok, RegAddr::ExtGain)?;
        Ok(decode_affine(code, GAIN_RANGE))
    }

    pub fn set_gain(&self, zdok: Zdok, core: Core, value: f32) -> Result<()> {
        self.write_register(zdok, RegAddr::ChanSel, core.chansel())?;
        self.write_register(zdok, RegAddr::ExtGain, encode_affine(value, GAIN_RANGE))?;
        self.write_register(zdok, RegAddr::CalCtrl, CAL_APPLY_GAIN)
    }

    pub fn phase(&self, zdok: Zdok, core: Core) -> Result<f32> {
        self.write_register(zdok, RegAddr::ChanSel, core.chansel())?;
        let code = self.read_register(zdok, RegAddr::ExtPhase)?;
        Ok(decode_affine(code, PHASE_RANGE))
    }

    pub fn set_phase(&self, zdok: Zdok, core: Core, value: f32) -> Result<()> {
        self.write_register(zdok, RegAddr::ChanSel, core.chansel())?;
        self.write_register(zdok, RegAddr::ExtPhase, encode_affine(value, PHASE_RANGE))?;
        self.write_register(zdok, RegAddr::CalCtrl, CAL_APPLY_PHASE)
    }

    /// Read the whole offset/gain/phase bank: one `[offset, gain, phase]`
    /// triple per core, in logical core order.
    pub fn read_ogp(&self, zdok: Zdok) -> Result<[[f32; 3]; 4]> {
        let mut ogp = [[0.0f32; 3]; 4];
        for (i, core) in Core::ALL.into_iter().enumerate() {
            ogp[i][0] = self.offset(zdok, core)?;
            ogp[i][1] = self.gain(zdok, core)?;
            ogp[i][2] = self.phase(zdok, core)?;
        }
        Ok(ogp)
    }

    /// Apply a whole offset/gain/phase bank, strobing each sub-register.
    pub fn write_ogp(&self, zdok: Zdok, ogp: &[[f32; 3]; 4]) -> Result<()> {
        for (i, core) in Core::ALL.into_iter().enumerate() {
            self.set_offset(zdok, core, ogp[i][0])?;
            self.set_gain(zdok, core, ogp[i][1])?;
            self.set_phase(zdok, core, ogp[i][2])?;
        }
        Ok(())
    }
}
