//! IEEE 1905.1 abstraction layer daemon.
//!
//! Runs the topology discovery engine on the interfaces listed in the
//! configuration file, hands outbound frames to the link layer and turns
//! modifications of the trigger file into topology notifications.

use clap::Parser;
use ieee1905_discovery::{Engine, EngineHandle, OutboundFrame};
use ieee1905_radio::StaticCollector;
use ieee1905_wire::MacAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;
mod trigger;

use config::AlConfig;
use logging::AlLogFormatter;
use trigger::TriggerFile;

/// 1905.1 abstraction layer topology discovery
#[derive(Parser, Debug)]
#[command(name = "al1905d", version, about = "IEEE 1905.1 abstraction layer daemon")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "al1905.yaml")]
    config: PathBuf,

    /// AL address, e.g. 00:ee:ff:33:44:00 (overrides the configuration file)
    #[arg(long)]
    al_mac: Option<MacAddr>,

    /// Topology-change trigger file (overrides the configuration file)
    #[arg(long)]
    topology_change_file: Option<PathBuf>,

    /// Discovery interval, e.g. 60s
    #[arg(long)]
    discovery_interval: Option<humantime::Duration>,

    /// Neighbor expiry, e.g. 140s
    #[arg(long)]
    neighbor_expiry: Option<humantime::Duration>,

    /// How often the trigger file is checked
    #[arg(long, default_value = "1s")]
    trigger_poll_interval: humantime::Duration,

    /// Period of the topology snapshot log, 0s disables it
    #[arg(long, default_value = "60s")]
    snapshot_interval: humantime::Duration,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Link-layer hand-off of outbound frames
async fn drain_outbound(mut rx: mpsc::UnboundedReceiver<OutboundFrame>) {
    let mut sent: u64 = 0;
    while let Some(OutboundFrame { interface, frame }) = rx.recv().await {
        let raw = frame.to_ethernet();
        sent += 1;
        match frame.header() {
            Ok(header) => debug!(
                iface = %interface,
                "TX {:?} mid {} fragment {} to {} ({} bytes, frame #{})",
                header.message_type,
                header.message_id,
                header.fragment_id,
                frame.dst,
                raw.len(),
                sent
            ),
            Err(e) => warn!(iface = %interface, "TX undecodable frame: {}", e),
        }
    }
    info!("Outbound queue closed after {} frames", sent);
}

/// Re-read the interface and radio sections of the configuration file
async fn reload_inventory(config: &Path, collector: &StaticCollector, engine: &EngineHandle) {
    let al_config = match AlConfig::load_from_file(config) {
        Ok(al_config) => al_config,
        Err(e) => {
            warn!("Keeping current inventory, reload failed: {}", e);
            return;
        }
    };
    let radios = match al_config.radio_inventory() {
        Ok(radios) => radios,
        Err(e) => {
            warn!("Keeping current inventory, invalid radio dump: {}", e);
            return;
        }
    };
    collector.replace(al_config.interfaces, radios).await;
    if let Err(e) = engine.refresh_inventory().await {
        warn!("Inventory refresh failed: {}", e);
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("al1905d={}", args.log_level).parse()?)
        .add_directive(format!("ieee1905_discovery={}", args.log_level).parse()?)
        .add_directive(format!("ieee1905_topology={}", args.log_level).parse()?)
        .add_directive(format!("ieee1905_storage={}", args.log_level).parse()?)
        .add_directive(format!("ieee1905_radio={}", args.log_level).parse()?)
        .add_directive(format!("ieee1905_wire={}", args.log_level).parse()?);

    let formatter = AlLogFormatter::new("al1905d".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true)
        .event_format(formatter)
        .init();

    info!("Starting 1905.1 AL daemon v{}", env!("CARGO_PKG_VERSION"));

    let mut al_config = AlConfig::load_from_file(&args.config)?;
    if let Some(al_mac) = args.al_mac {
        al_config.al_mac = al_mac;
    }
    if let Some(path) = args.topology_change_file {
        al_config.topology_change_file = path;
    }
    if let Some(interval) = args.discovery_interval {
        al_config.timers.discovery_interval = interval.into();
    }
    if let Some(expiry) = args.neighbor_expiry {
        al_config.timers.neighbor_expiry = expiry.into();
    }

    let radios = al_config.radio_inventory()?;
    let collector = StaticCollector::new(al_config.interfaces.clone(), radios);

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let link_task = tokio::spawn(drain_outbound(outbound_rx));

    let engine = Engine::start(
        al_config.engine_config(),
        Arc::new(collector.clone()),
        outbound_tx,
    ).await?;
    info!(
        "AL {} running on {} interfaces",
        engine.al_mac(),
        engine.interfaces().await.len()
    );

    let mut trigger = TriggerFile::new(al_config.topology_change_file.clone()).await;
    info!("Watching {:?} for topology changes", trigger.path());
    let mut trigger_poll = tokio::time::interval(args.trigger_poll_interval.into());
    trigger_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut snapshot_timer = if args.snapshot_interval.is_zero() {
        None
    } else {
        let mut timer = tokio::time::interval(args.snapshot_interval.into());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Some(timer)
    };

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {}", e))?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGINT handler: {}", e))?;
    let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGHUP handler: {}", e))?;

    loop {
        tokio::select! {
            biased;

            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                break;
            }

            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
                break;
            }

            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading interfaces and radios");
                reload_inventory(&args.config, &collector, &engine).await;
            }

            _ = trigger_poll.tick() => {
                if trigger.poll().await {
                    engine.topology_changed().await;
                }
            }

            _ = async {
                match snapshot_timer.as_mut() {
                    Some(timer) => {
                        timer.tick().await;
                    }
                    None => std::future::pending().await,
                }
            } => {
                let devices = engine.topology_snapshot().await;
                let stats = engine.topology_stats().await;
                match serde_json::to_string(&devices) {
                    Ok(json) => info!(
                        "Topology: {} devices, {} links: {}",
                        stats.total_devices, stats.total_links, json
                    ),
                    Err(e) => warn!("Failed to serialize topology snapshot: {}", e),
                }
            }
        }
    }

    engine.shutdown().await;
    link_task.abort();
    info!("1905.1 AL daemon stopped");
    Ok(())
}
