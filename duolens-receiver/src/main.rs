//! duolens-receiver: collect frame uploads and keep per-side latest files.

use clap::Parser;
use duolens_receiver::{FrameStore, router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "duolens-receiver", about = "Stereo frame collector")]
struct Args {
    /// Listen address.
    #[arg(short, long, default_value = "0.0.0.0:5005")]
    bind: SocketAddr,

    /// Directory for archived frames and latest pointers.
    #[arg(short, long, default_value = "./frames")]
    frames: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let store = Arc::new(FrameStore::new(&args.frames)?);
    info!("storing frames under {}", store.dir().display());

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!("listening on {}", args.bind);
    axum::serve(listener, router(store)).await?;
    Ok(())
}
