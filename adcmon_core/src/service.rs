//! Service wiring and lifecycle.
//!
//! `init` resolves the device handle into the shared lock, builds the
//! capture and register paths on top of it, and spawns the dispatch worker.
//! `uninit` tears everything down in order: the dispatch worker stops the
//! monitor first, then exits, then the store is released with it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use adcmon_config::Config;
use adcmon_traits::{AdcDevice, CalStore, Clock, Telemetry};
use crossbeam_channel as xch;

use crate::calstore::CalCache;
use crate::dispatch::{Command, DispatchParams, Dispatcher};
use crate::snapshot::Capturer;
use crate::spi::RegisterIo;
use crate::task::TaskPhase;

pub struct AdcService<D: AdcDevice> {
    dispatcher: Option<Dispatcher>,
    cmd_tx: xch::Sender<Command>,
    capturer: Capturer<D>,
    registers: RegisterIo<D>,
}

impl<D: AdcDevice + Send + 'static> AdcService<D> {
    /// Wire the device behind the shared lock and spawn the dispatch worker.
    pub fn init<S, T>(
        dev: D,
        store: S,
        telemetry: T,
        cfg: &Config,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self
    where
        S: CalStore + Send + 'static,
        T: Telemetry + Clone + Send + 'static,
    {
        let dev = Arc::new(Mutex::new(dev));
        let capturer = Capturer::new(
            Arc::clone(&dev),
            Arc::clone(&clock),
            cfg.timing.poll_limit,
            Duration::from_micros(cfg.timing.poll_interval_us),
        );
        let registers = RegisterIo::new(
            dev,
            Arc::clone(&clock),
            Duration::from_micros(cfg.timing.spi_settle_us),
        );
        let cache = CalCache::new(store);
        let params = DispatchParams {
            cmd_gap: Duration::from_millis(cfg.dispatch.cmd_gap_ms),
            monitor_period: Duration::from_millis(cfg.monitor.period_ms),
            hist_publish_every: cfg.monitor.hist_publish_every,
            dump_path: cfg.snapshot.dump_path.clone().into(),
        };
        let (dispatcher, cmd_tx) = Dispatcher::spawn(
            capturer.clone(),
            cache,
            telemetry,
            clock,
            params,
            cfg.dispatch.queue_depth,
        );
        tracing::info!("service initialized");
        Self {
            dispatcher: Some(dispatcher),
            cmd_tx,
            capturer,
            registers,
        }
    }

    /// Queue for submitting commands to the dispatch worker.
    pub fn sender(&self) -> xch::Sender<Command> {
        self.cmd_tx.clone()
    }

    /// Direct capture path, sharing the device lock with the tasks.
    pub fn capturer(&self) -> Capturer<D> {
        self.capturer.clone()
    }

    /// Typed register access, sharing the device lock with the tasks.
    pub fn registers(&self) -> RegisterIo<D> {
        self.registers.clone()
    }

    pub fn dispatch_phase(&self) -> Option<TaskPhase> {
        self.dispatcher.as_ref().map(|d| d.state().phase())
    }

    pub fn monitor_phase(&self) -> Option<TaskPhase> {
        self.dispatcher.as_ref().and_then(|d| d.monitor_phase())
    }

    /// Stop everything. The dispatch worker stops the monitor before it
    /// reports stopped, so the teardown order is monitor, dispatch, store.
    pub fn uninit(&mut self) {
        if let Some(mut dispatcher) = self.dispatcher.take() {
            dispatcher.stop();
            tracing::info!("service stopped");
        }
    }
}

impl<D: AdcDevice> Drop for AdcService<D> {
    fn drop(&mut self) {
        // Backstop; uninit is idempotent.
        if let Some(mut dispatcher) = self.dispatcher.take() {
            dispatcher.stop();
        }
    }
}
