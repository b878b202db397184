//! Serialized command worker.
//!
//! One thread owns the calibration cache and the monitor handle; commands
//! arrive on a bounded channel and are processed strictly in order. The
//! blocking receive is interruptible by a dedicated shutdown channel, so
//! stopping the worker never waits for a command to arrive. A result record
//! is published for every command, success or not, and a fixed gap keeps
//! commands from hammering the bus back to back.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use adcmon_traits::{AdcDevice, CalStore, Clock, CommandReturn, Telemetry, Zdok};
use crossbeam_channel as xch;

use crate::calstore::CalCache;
use crate::error::AdcError;
use crate::monitor::Monitor;
use crate::snapshot::{Capturer, Snapshot};
use crate::task::{TaskPhase, TaskState};

/// Repeat count used when a measure command passes 0.
pub const DEFAULT_MEASURE_REPEAT: u32 = 100;
/// Largest accepted repeat count.
pub const MAX_MEASURE_REPEAT: i32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    StartMonitor,
    StopMonitor,
    MeasureOffsetGain,
    TakeSnapshot,
    /// Reserved: accepted and reported as not implemented.
    SetCalibration,
    /// Reserved: accepted and reported as not implemented.
    UpdateCalibration,
}

/// One queued command. `zdok` and `repeat` use the external wire encoding:
/// zdok 0/1 for one line, 2 for both; repeat 0 for the default.
#[derive(Debug, Clone, Copy)]
pub struct Command {
    pub kind: CommandKind,
    pub zdok: i32,
    pub repeat: i32,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            zdok: 2,
            repeat: 0,
        }
    }

    pub fn with_zdok(mut self, zdok: i32) -> Self {
        self.zdok = zdok;
        self
    }

    pub fn with_repeat(mut self, repeat: i32) -> Self {
        self.repeat = repeat;
        self
    }
}

/// Status codes carried in `CommandReturn::status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CmdStatus {
    Ok = 0,
    InvalidArgument = 1,
    HardwareFault = 2,
    PersistenceFault = 3,
    AlreadyRunning = 4,
    NotRunning = 5,
    NotImplemented = 6,
    IoFault = 7,
}

/// Decode the external zdok selector. 0 and 1 name one line, 2 names both.
pub fn zdok_selection(sel: i32) -> std::result::Result<&'static [Zdok], AdcError> {
    match sel {
        0 => Ok(&Zdok::ALL[0..1]),
        1 => Ok(&Zdok::ALL[1..2]),
        2 => Ok(&Zdok::ALL),
        _ => Err(AdcError::InvalidArgument("zdok selector must be 0, 1 or 2")),
    }
}

/// Decode the external repeat count. 0 picks the default.
pub fn resolve_repeat(repeat: i32) -> std::result::Result<u32, AdcError> {
    match repeat {
        0 => Ok(DEFAULT_MEASURE_REPEAT),
        1..=MAX_MEASURE_REPEAT => Ok(repeat as u32),
        _ => Err(AdcError::InvalidArgument("repeat count out of range")),
    }
}

fn status_of(e: &eyre::Report) -> CmdStatus {
    match e.downcast_ref::<AdcError>() {
        Some(AdcError::InvalidArgument(_)) => CmdStatus::InvalidArgument,
        Some(
            AdcError::PersistenceRead(_) | AdcError::PersistenceWrite(_) | AdcError::NotWarm,
        ) => CmdStatus::PersistenceFault,
        Some(AdcError::AlreadyRunning) => CmdStatus::AlreadyRunning,
        Some(AdcError::NotRunning) => CmdStatus::NotRunning,
        Some(AdcError::Io(_)) => CmdStatus::IoFault,
        _ => CmdStatus::HardwareFault,
    }
}

/// Derive the per-line dump file for `base`: the zdok name is appended to
/// the file stem, keeping the extension.
pub fn snapshot_file(base: &Path, zdok: Zdok) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{stem}_{zdok}");
    if let Some(ext) = base.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    base.with_file_name(name)
}

fn dump_snapshot(path: &Path, snap: &Snapshot) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for s in snap.samples() {
        writeln!(out, "{s}")?;
    }
    out.flush()
}

/// Everything the worker needs beyond its channels.
pub struct DispatchParams {
    pub cmd_gap: Duration,
    pub monitor_period: Duration,
    pub hist_publish_every: u32,
    pub dump_path: PathBuf,
}

pub struct Dispatcher {
    state: Arc<TaskState>,
    monitor_state: Arc<Mutex<Option<Arc<TaskState>>>>,
    shutdown_tx: xch::Sender<()>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

struct Worker<D: AdcDevice, S: CalStore, T: Telemetry + Clone> {
    capturer: Capturer<D>,
    cache: CalCache<S>,
    telemetry: T,
    clock: Arc<dyn Clock + Send + Sync>,
    params: DispatchParams,
    monitor: Option<Monitor>,
    monitor_state: Arc<Mutex<Option<Arc<TaskState>>>>,
}

impl<D, S, T> Worker<D, S, T>
where
    D: AdcDevice + Send + 'static,
    S: CalStore,
    T: Telemetry + Clone + Send + 'static,
{
    fn set_monitor_slot(&self, state: Option<Arc<TaskState>>) {
        *self
            .monitor_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn start_monitor(&mut self) -> CommandReturn {
        if self.monitor.is_some() {
            return CommandReturn {
                status: CmdStatus::AlreadyRunning as i32,
                ..CommandReturn::default()
            };
        }
        let monitor = Monitor::spawn(
            self.capturer.clone(),
            self.telemetry.clone(),
            Arc::clone(&self.clock),
            self.params.monitor_period,
            self.params.hist_publish_every,
        );
        self.set_monitor_slot(Some(monitor.state()));
        self.monitor = Some(monitor);
        tracing::info!("monitor started");
        CommandReturn::default()
    }

    fn stop_monitor(&mut self) -> CommandReturn {
        match self.monitor.take() {
            Some(mut monitor) => {
                monitor.stop();
                self.set_monitor_slot(None);
                tracing::info!("monitor stopped");
                CommandReturn::default()
            }
            None => CommandReturn {
                status: CmdStatus::NotRunning as i32,
                ..CommandReturn::default()
            },
        }
    }

    fn measure(&mut self, cmd: Command) -> CommandReturn {
        let zdoks = match zdok_selection(cmd.zdok) {
            Ok(z) => z,
            Err(_) => {
                return CommandReturn {
                    status: CmdStatus::InvalidArgument as i32,
                    ..CommandReturn::default()
                };
            }
        };
        let repeat = match resolve_repeat(cmd.repeat) {
            Ok(r) => r,
            Err(_) => {
                return CommandReturn {
                    status: CmdStatus::InvalidArgument as i32,
                    ..CommandReturn::default()
                };
            }
        };
        for &zdok in zdoks {
            if let Err(e) = self.cache.measure_and_update(&self.capturer, zdok, repeat) {
                tracing::error!(%zdok, error = %e, "measurement failed");
                return CommandReturn {
                    status: status_of(&e) as i32,
                    failed_zdok: zdok.index() as i32,
                    snapshot_len: 0,
                };
            }
        }
        CommandReturn::default()
    }

    fn take_snapshot(&mut self, cmd: Command) -> CommandReturn {
        let zdoks = match zdok_selection(cmd.zdok) {
            Ok(z) => z,
            Err(_) => {
                return CommandReturn {
                    status: CmdStatus::InvalidArgument as i32,
                    ..CommandReturn::default()
                };
            }
        };
        let mut len = 0i32;
        for &zdok in zdoks {
            let snap = match self.capturer.capture(zdok) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(%zdok, error = %e, "snapshot capture failed");
                    return CommandReturn {
                        status: status_of(&e) as i32,
                        failed_zdok: zdok.index() as i32,
                        snapshot_len: 0,
                    };
                }
            };
            let path = snapshot_file(&self.params.dump_path, zdok);
            if let Err(e) = dump_snapshot(&path, &snap) {
                tracing::error!(%zdok, error = %e, path = %path.display(), "snapshot dump failed");
                return CommandReturn {
                    status: CmdStatus::IoFault as i32,
                    failed_zdok: zdok.index() as i32,
                    snapshot_len: 0,
                };
            }
            len = snap.len() as i32;
        }
        CommandReturn {
            snapshot_len: len,
            ..CommandReturn::default()
        }
    }

    fn run_command(&mut self, cmd: Command) -> CommandReturn {
        match cmd.kind {
            CommandKind::StartMonitor => self.start_monitor(),
            CommandKind::StopMonitor => self.stop_monitor(),
            CommandKind::MeasureOffsetGain => self.measure(cmd),
            CommandKind::TakeSnapshot => self.take_snapshot(cmd),
            CommandKind::SetCalibration | CommandKind::UpdateCalibration => {
                tracing::warn!(kind = ?cmd.kind, "reserved command, not implemented");
                CommandReturn {
                    status: CmdStatus::NotImplemented as i32,
                    ..CommandReturn::default()
                }
            }
        }
    }
}

impl Dispatcher {
    /// Spawn the worker thread and return the handle plus its command queue.
    pub fn spawn<D, S, T>(
        capturer: Capturer<D>,
        cache: CalCache<S>,
        telemetry: T,
        clock: Arc<dyn Clock + Send + Sync>,
        params: DispatchParams,
        queue_depth: usize,
    ) -> (Self, xch::Sender<Command>)
    where
        D: AdcDevice + Send + 'static,
        S: CalStore + Send + 'static,
        T: Telemetry + Clone + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = xch::bounded::<Command>(queue_depth);
        let (shutdown_tx, shutdown_rx) = xch::bounded::<()>(1);
        let state = Arc::new(TaskState::new());
        state.set(TaskPhase::Running);
        let state_clone = Arc::clone(&state);
        let monitor_state = Arc::new(Mutex::new(None));

        let mut worker = Worker {
            capturer,
            cache,
            telemetry,
            clock,
            params,
            monitor: None,
            monitor_state: Arc::clone(&monitor_state),
        };

        let join_handle = std::thread::spawn(move || {
            loop {
                xch::select! {
                    recv(cmd_rx) -> msg => match msg {
                        Ok(cmd) => {
                            tracing::debug!(?cmd, "command received");
                            let rtn = worker.run_command(cmd);
                            if let Err(e) = worker.telemetry.publish_command_result(rtn) {
                                tracing::warn!(error = %e, "command result publish failed");
                            }
                            worker.clock.sleep(worker.params.cmd_gap);
                        }
                        Err(_) => {
                            tracing::debug!("command queue disconnected");
                            break;
                        }
                    },
                    recv(shutdown_rx) -> _ => {
                        tracing::debug!("dispatch received shutdown");
                        break;
                    }
                }
            }

            // The monitor must be fully stopped before this task reports
            // Stopped; observers rely on that ordering.
            if let Some(mut monitor) = worker.monitor.take() {
                monitor.stop();
                worker.set_monitor_slot(None);
            }
            state_clone.set(TaskPhase::Stopped);
            tracing::trace!("dispatch thread exiting cleanly");
        });

        (
            Self {
                state,
                monitor_state,
                shutdown_tx,
                join_handle: Some(join_handle),
            },
            cmd_tx,
        )
    }

    pub fn state(&self) -> Arc<TaskState> {
        Arc::clone(&self.state)
    }

    /// Lifecycle phase of the monitor, if one has been started.
    pub fn monitor_phase(&self) -> Option<TaskPhase> {
        self.monitor_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.phase())
    }

    /// Shared handle on the monitor's lifecycle state, if one is running.
    pub fn monitor_state(&self) -> Option<Arc<TaskState>> {
        self.monitor_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop the worker, stopping the monitor first if it is running.
    pub fn stop(&mut self) {
        self.state.request_stop();
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("dispatch thread joined"),
                Err(e) => tracing::warn!(?e, "dispatch thread panicked during shutdown"),
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
