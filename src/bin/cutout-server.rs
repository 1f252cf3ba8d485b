//! Background-removal HTTP server binary

use anyhow::Context;
use clap::Parser;
use cutout::backends::tract::{TractBackendConfig, TractSegmentationBackend};
use cutout::{AppState, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cutout-server", about = "HTTP background-removal service")]
struct Args {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Directory for completed result rasters
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Downscale threshold: larger input dimensions are bounded to this
    #[arg(long, default_value_t = 2048)]
    max_dimension: u32,

    /// Path to the ONNX segmentation model
    #[arg(long)]
    model: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ServerConfig::builder()
        .bind_addr(args.bind)
        .results_dir(args.results_dir)
        .max_dimension(args.max_dimension)
        .model_path(&args.model)
        .build()
        .context("invalid server configuration")?;

    // Model weights load lazily behind the gate on the first inference.
    let backend = TractSegmentationBackend::new(TractBackendConfig::new(&config.model_path));
    let (state, rx) = AppState::new(Box::new(backend), &config)
        .context("failed to initialize application state")?;

    tokio::spawn(cutout::queue::run_worker(
        rx,
        state.queue.clone(),
        state.registry.clone(),
        state.pipeline.clone(),
        state.results.clone(),
    ));

    let app = cutout::server::app_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(bind = %config.bind_addr, model = %config.model_path.display(), "serving");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
