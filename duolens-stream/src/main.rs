//! duolens-stream: capture alternating stereo frames and push them to the
//! collector.

use clap::Parser;
use duolens_capture::{SideSelector, SimulatedSensor};
use duolens_stream::{CaptureLoop, LinkSupervisor, StreamConfig, TcpLinkBackend};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "duolens-stream", about = "Stereo frame capture and streaming device")]
struct Args {
    /// JSON config file; absent keys keep their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the collector address (host:port).
    #[arg(short, long)]
    server: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => StreamConfig::load(path)?,
        None => StreamConfig::default(),
    };
    if let Some(server) = args.server {
        cfg.server_addr = server;
    }
    info!(
        "streaming {:?} {}x{} to {} ({})",
        cfg.mode,
        cfg.width,
        cfg.height,
        cfg.server_addr,
        if cfg.stitch { "stitched" } else { "per-side" }
    );

    let sensor = SimulatedSensor::new(cfg.width, cfg.height, cfg.pixel_format)
        .with_settle_delay(Duration::from_millis(cfg.settle_ms))
        .with_warmup_pairs(cfg.warmup_pairs);
    let selector = SideSelector::new(sensor);
    let supervisor = LinkSupervisor::new(
        TcpLinkBackend::new(cfg.server_addr.clone()),
        cfg.transport(),
        cfg.supervisor(),
    );

    CaptureLoop::new(selector, supervisor, cfg).run().await;
    Ok(())
}
