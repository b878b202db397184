#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core ADC calibration and health-monitoring logic (hardware-agnostic).
//!
//! All hardware interactions go through the `adcmon_traits::AdcDevice`
//! trait; persistence through `adcmon_traits::CalStore`; reporting through
//! `adcmon_traits::Telemetry`.
//!
//! ## Architecture
//!
//! - **SPI register access**: typed offset/gain/phase registers (`spi`)
//! - **Snapshot capture**: arm/start/poll over the scope buffers (`snapshot`)
//! - **Estimation**: per-core statistics from noise captures (`estimator`)
//! - **Calibration cache**: single-owner record with warm gate (`calstore`)
//! - **Monitoring**: background loading/histogram task (`monitor`)
//! - **Dispatch**: serialized command worker (`dispatch`)
//! - **Service**: wiring and lifecycle (`service`)

pub mod calstore;
pub mod dispatch;
pub mod error;
pub mod estimator;
pub mod hw_error;
pub mod mocks;
pub mod monitor;
pub mod service;
pub mod snapshot;
pub mod spi;
pub mod task;

pub use crate::error::{AdcError, Result};
pub use crate::hw_error::map_hw_error_dyn;

pub use crate::calstore::CalCache;
pub use crate::dispatch::{Command, CommandKind, Dispatcher};
pub use crate::estimator::{NoiseEstimate, estimate_from_noise};
pub use crate::monitor::Monitor;
pub use crate::service::AdcService;
pub use crate::snapshot::{Capturer, MAX_SNAPSHOT_LEN, Snapshot};
pub use crate::spi::{Core, RegAddr, RegisterIo};
pub use crate::task::{TaskPhase, TaskState};
