//! ADC monitor CLI: service runner plus one-shot calibration operations.

mod cli;
mod store;
mod telemetry;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use eyre::{Result, WrapErr};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use adcmon_config::Config;
use adcmon_core::dispatch::{resolve_repeat, zdok_selection};
use adcmon_core::{AdcService, CalCache, Capturer, Command, CommandKind, RegisterIo};
use adcmon_traits::{AdcDevice, Clock, MonotonicClock, Zdok};

use crate::cli::{Cli, Commands, FILE_GUARD};
use crate::store::FileStore;
use crate::telemetry::LogTelemetry;

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    let cfg = if args.config.exists() {
        adcmon_config::load(&args.config)?
    } else {
        Config::default()
    };
    init_logging(&args, &cfg)?;

    match args.cmd {
        Commands::Run { monitor } => run_service(&cfg, args.json, monitor),
        Commands::Snapshot { zdok } => snapshot(&cfg, args.json, zdok),
        Commands::Measure { zdok, repeat } => measure(&cfg, args.json, zdok, repeat),
        Commands::Ogp { zdok, load } => ogp(&cfg, args.json, zdok, load.as_deref()),
        Commands::SelfCheck => self_check(&cfg, args.json),
    }
}

fn init_logging(args: &Cli, cfg: &Config) -> Result<()> {
    // The flag wins; the config level only fills in when the flag was left
    // at its default.
    let level = match (&cfg.logging.level, args.log_level.as_str()) {
        (Some(cfg_level), "info") => cfg_level.clone(),
        _ => args.log_level.clone(),
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .wrap_err("invalid log level")?;
    let console = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter).with(console);

    if let Some(file) = &cfg.logging.file {
        let path = Path::new(file);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file has no file name"))?;
        let dir = dir.unwrap_or_else(|| Path::new("."));
        let appender = match cfg.logging.rotation.as_deref().unwrap_or("never") {
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        registry
            .with(fmt::layer().json().with_writer(writer))
            .init();
    } else {
        registry.init();
    }
    Ok(())
}

fn build_device(cfg: &Config) -> Result<Box<dyn AdcDevice + Send>> {
    #[cfg(feature = "hardware")]
    if let Some(path) = &cfg.hardware.map_path {
        let dev = adcmon_hardware::mapped::MappedAdc::open(Path::new(path), &cfg.hardware.registers)
            .wrap_err_with(|| format!("opening mapped device {path}"))?;
        tracing::info!(path, "using mapped device");
        return Ok(Box::new(dev));
    }
    #[cfg(not(feature = "hardware"))]
    if cfg.hardware.map_path.is_some() {
        tracing::warn!("hardware.map_path set but the hardware feature is off; using simulator");
    }
    Ok(Box::new(adcmon_hardware::SimulatedAdc::new(0xadc5)))
}

/// Capture/register paths for the one-shot commands, sharing one lock.
struct DirectPaths {
    capturer: Capturer<Box<dyn AdcDevice + Send>>,
    registers: RegisterIo<Box<dyn AdcDevice + Send>>,
}

fn direct_paths(cfg: &Config) -> Result<DirectPaths> {
    let dev = Arc::new(Mutex::new(build_device(cfg)?));
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let capturer = Capturer::new(
        Arc::clone(&dev),
        Arc::clone(&clock),
        cfg.timing.poll_limit,
        Duration::from_micros(cfg.timing.poll_interval_us),
    );
    let registers = RegisterIo::new(dev, clock, Duration::from_micros(cfg.timing.spi_settle_us));
    Ok(DirectPaths {
        capturer,
        registers,
    })
}

fn run_service(cfg: &Config, json: bool, monitor: bool) -> Result<()> {
    let dev = build_device(cfg)?;
    let store = FileStore::new(&cfg.calibration.file);
    let mut service = AdcService::init(
        dev,
        store,
        LogTelemetry::new(json),
        cfg,
        Arc::new(MonotonicClock::new()),
    );

    if monitor {
        service
            .sender()
            .send(Command::new(CommandKind::StartMonitor))
            .wrap_err("queueing monitor start")?;
    }

    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        stop_handler.store(true, Ordering::SeqCst);
    })
    .wrap_err("installing signal handler")?;

    tracing::info!("service running, interrupt to stop");
    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }

    service.uninit();
    Ok(())
}

fn snapshot(cfg: &Config, json: bool, zdok: i32) -> Result<()> {
    let zdoks = zdok_selection(zdok).map_err(|e| eyre::eyre!(e))?;
    let paths = direct_paths(cfg)?;
    for &z in zdoks {
        let snap = paths.capturer.capture(z)?;
        let out = adcmon_core::dispatch::snapshot_file(Path::new(&cfg.snapshot.dump_path), z);
        let body: String = snap.samples().iter().map(|s| format!("{s}\n")).collect();
        std::fs::write(&out, body)
            .wrap_err_with(|| format!("writing {}", out.display()))?;
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "event": "snapshot",
                    "zdok": z.index(),
                    "len": snap.len(),
                    "path": out.display().to_string(),
                })
            );
        } else {
            println!("{z}: {} samples -> {}", snap.len(), out.display());
        }
    }
    Ok(())
}

fn measure(cfg: &Config, json: bool, zdok: i32, repeat: i32) -> Result<()> {
    let zdoks = zdok_selection(zdok).map_err(|e| eyre::eyre!(e))?;
    let repeat = resolve_repeat(repeat).map_err(|e| eyre::eyre!(e))?;
    let paths = direct_paths(cfg)?;
    let mut cache = CalCache::new(FileStore::new(&cfg.calibration.file));

    for &z in zdoks {
        let est = cache.measure_and_update(&paths.capturer, z, repeat)?;
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "event": "measure",
                    "zdok": z.index(),
                    "repeat": repeat,
                    "offs": est.offs,
                    "gains": est.gains,
                    "overload": est.overload,
                    "avz": est.avz,
                    "avamp": est.avamp,
                })
            );
        } else {
            println!("{z}: avz {:.3}  avamp {:.3}", est.avz, est.avamp);
            for (core, name) in ["A", "B", "C", "D"].iter().enumerate() {
                println!(
                    "  core {name}: offset {:+.3}  gain {:+.3}%  overload {}",
                    est.offs[core], est.gains[core], est.overload[core]
                );
            }
        }
    }
    if !json {
        println!("record written to {}", cfg.calibration.file);
    }
    Ok(())
}

fn ogp(cfg: &Config, json: bool, zdok: i32, load: Option<&Path>) -> Result<()> {
    let zdok = Zdok::from_index(usize::try_from(zdok).unwrap_or(usize::MAX))
        .ok_or_else(|| eyre::eyre!("zdok must be 0 or 1"))?;
    let paths = direct_paths(cfg)?;

    if let Some(file) = load {
        let bank = store::read_ogp_file(file)?;
        paths.registers.write_ogp(zdok, &bank)?;
        println!("ogp bank from {} applied to {zdok}", file.display());
        return Ok(());
    }

    let bank = paths.registers.read_ogp(zdok)?;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "event": "ogp",
                "zdok": zdok.index(),
                "bank": bank,
            })
        );
    } else {
        for (core, name) in ["A", "B", "C", "D"].iter().enumerate() {
            println!(
                "core {name}: offset {:+.3}  gain {:+.3}  phase {:+.3}",
                bank[core][0], bank[core][1], bank[core][2]
            );
        }
    }
    Ok(())
}

fn self_check(cfg: &Config, json: bool) -> Result<()> {
    let paths = direct_paths(cfg)?;
    for z in Zdok::ALL {
        let snap = paths
            .capturer
            .capture(z)
            .wrap_err_with(|| format!("capture on {z}"))?;
        if snap.is_empty() {
            eyre::bail!("{z}: capture returned no samples");
        }
    }
    if json {
        println!("{}", serde_json::json!({ "event": "self_check", "ok": true }));
    } else {
        println!("ok");
    }
    Ok(())
}
