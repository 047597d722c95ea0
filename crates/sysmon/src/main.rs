//! sysmon
//!
//! Terminal hardware monitor: polls the available sensor backends in the
//! background and prints the latest reconciled snapshot.

mod config;
mod display;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sysmon_telemetry::{
    HardwareInventory, HwmonBackend, Poller, SensorSource, Snapshot, SnapshotStore,
    SysinfoBackend,
};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;

#[derive(Parser)]
#[command(name = "sysmon")]
#[command(about = "Hardware telemetry monitor")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Print a single snapshot and exit
    #[arg(long)]
    once: bool,

    /// Print snapshots as JSON, one per line
    #[arg(long)]
    json: bool,

    /// Screen refresh interval in milliseconds (overrides the config file)
    #[arg(long)]
    refresh_ms: Option<u64>,

    /// Log filter directive, e.g. "debug" or "sysmon_telemetry=trace"
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for snapshots
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                cli.log_level
                    .parse()
                    .context("Invalid --log-level directive")?,
            ),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load_or_default(&cli.config).context("Failed to load configuration")?;
    if let Some(ms) = cli.refresh_ms {
        config.display.refresh_ms = ms;
    }

    let hwmon_root = PathBuf::from(&config.sources.hwmon_root);
    let inventory =
        tokio::task::spawn_blocking(move || HardwareInventory::collect_with_hwmon_root(&hwmon_root))
            .await
            .context("Failed to collect hardware inventory")?;
    info!("{}", inventory.summary());

    let sources = probe_sources(&config).await;
    if sources.is_empty() {
        bail!("No sensor backend available on this host");
    }

    let store = Arc::new(SnapshotStore::new(config.telemetry.history_len));
    let mut poller = Poller::new(config.telemetry.clone(), sources, Arc::clone(&store))
        .context("Failed to create poller")?;

    if cli.once {
        // CPU load is a delta, so the first cycle only primes it.
        poller.run_cycle().await;
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        let snapshot = poller.run_cycle().await;
        print_snapshot(&snapshot, &inventory, &config, cli.json, false)?;
        return Ok(());
    }

    let handle = poller.spawn();

    // Setup Unix signal handlers
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let clear = !cli.json && std::io::stdout().is_terminal();
    let mut refresh = tokio::time::interval(Duration::from_millis(config.display.refresh_ms.max(1)));
    let mut consecutive_errors: u32 = 0;

    loop {
        tokio::select! {
            _ = refresh.tick() => {
                let snapshot = store.current();
                if let Err(e) = print_snapshot(&snapshot, &inventory, &config, cli.json, clear) {
                    consecutive_errors += 1;
                    if consecutive_errors == 1 {
                        warn!("Display error: {}", e);
                    }
                } else {
                    consecutive_errors = 0;
                }
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, re-checking excluded sources");
                handle.recheck();
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
                break;
            }
        }
    }

    handle.shutdown();
    handle.join().await;
    Ok(())
}

/// Builds the enabled backends and keeps those whose probe passes.
///
/// Unsupported or access-denied backends are left out; other probe failures
/// are left to the poller's health tracking.
async fn probe_sources(config: &Config) -> Vec<SensorSource> {
    let timeout = config.telemetry.source_timeout();
    let mut candidates = Vec::new();
    if config.sources.hwmon {
        candidates.push(SensorSource::new(HwmonBackend::with_root(
            config.sources.hwmon_root.as_str(),
        )));
    }
    if config.sources.sysinfo {
        candidates.push(SensorSource::new(
            SysinfoBackend::new().with_per_core(config.sources.per_core),
        ));
    }

    let mut sources = Vec::new();
    for source in candidates {
        match source.probe(timeout).await {
            Ok(()) => {
                info!("Source {} available", source.id());
                sources.push(source);
            }
            Err(e) if e.is_permanent() => {
                info!("Source {} not used: {}", source.id(), e);
            }
            Err(e) => {
                warn!("Source {} probe failed, polling anyway: {}", source.id(), e);
                sources.push(source);
            }
        }
    }
    sources
}

fn print_snapshot(
    snapshot: &Snapshot,
    inventory: &HardwareInventory,
    config: &Config,
    json: bool,
    clear: bool,
) -> Result<()> {
    if json {
        let line = serde_json::to_string(snapshot).context("Failed to serialize snapshot")?;
        println!("{}", line);
        return Ok(());
    }
    if clear {
        print!("\x1B[2J\x1B[H");
    }
    print!(
        "{}",
        display::render(snapshot, inventory, config.display.show_alternates)
    );
    Ok(())
}
