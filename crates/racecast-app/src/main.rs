use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use racecast_core::demo::{DemoTransport, VehicleSimulator};
use racecast_core::pipeline::{Pipeline, SystemClock, TelemetrySnapshot};
use racecast_core::prelude::{PipelineConfig, Transport};

#[derive(Debug, Parser)]
#[command(name = "racecast", version, about = "Live vehicle telemetry over MQTT")]
struct Cli {
    /// JSON configuration file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the broker host
    #[arg(long)]
    host: Option<String>,

    /// Override the broker port
    #[arg(long)]
    port: Option<u16>,

    /// Run against the built-in vehicle simulator instead of a broker
    #[arg(long)]
    demo: bool,

    /// Simulator publish period in milliseconds
    #[arg(long, default_value_t = 200)]
    demo_interval_ms: u64,

    /// Print snapshots as JSON lines
    #[arg(long)]
    json: bool,
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut cfg = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(host) = &cli.host {
        cfg.transport.host = host.clone();
    }
    if let Some(port) = cli.port {
        cfg.transport.port = port;
    }
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

fn print_snapshot(snap: &TelemetrySnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snap)?);
    } else {
        let live = if snap.has_data { "live" } else { "no data" };
        println!(
            "{:>7.2} km/h  {:>5} rpm  {:>3}% throttle  [{}, {}]",
            snap.speed, snap.rpm, snap.throttle, snap.connection, live
        );
    }
    Ok(())
}

async fn run<T: Transport>(mut pipeline: Pipeline<T>, json: bool) -> Result<()> {
    let mut snapshots = pipeline.subscribe();
    print_snapshot(&snapshots.borrow_and_update(), json)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    warn!("pipeline stopped publishing");
                    break;
                }
                let snap = *snapshots.borrow_and_update();
                print_snapshot(&snap, json)?;
            }
        }
    }

    pipeline.shutdown().await;
    let stats = pipeline.stats();
    info!(
        "accepted {} / stale {} / unrecognized {} / invalid {} / undecodable {}",
        stats.accepted, stats.stale, stats.unrecognized, stats.invalid_value, stats.decode_errors
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli)?;
    info!("racecast {}", racecast_core::VERSION);

    if cli.demo {
        info!("demo mode: simulated vehicle every {}ms", cli.demo_interval_ms);
        let transport = DemoTransport::new(
            VehicleSimulator::new(),
            Duration::from_millis(cli.demo_interval_ms),
        );
        let pipeline = Pipeline::spawn(&cfg, transport, SystemClock)
            .context("starting demo pipeline")?;
        run(pipeline, cli.json).await
    } else {
        info!("connecting to {}", cfg.transport.broker_url());
        let pipeline = Pipeline::with_mqtt(&cfg).context("starting pipeline")?;
        run(pipeline, cli.json).await
    }
}
