use std::sync::Arc;

use anyhow::{Context, Result};
use beach_surf_server::app::{self, AppState};
use beach_surf_server::config::{Cli, SeedConfig, ServerConfig};
use beach_surf_server::context::SurfContext;
use beach_surf_server::encoder::FrameEncoder;
use beach_surf_server::engine::{EngineWorker, SyntheticEngine, SyntheticEngineConfig};
use beach_surf_server::frame::Frame;
use beach_surf_server::seed::{load_seed_file, HttpSeedSource, SeedSource};
use beach_surf_server::telemetry::Telemetry;
use beach_surf_server::world::WorldState;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::try_from(cli)?;
    let telemetry = Telemetry::init(&config.log_filter, config.otel_stdout)?;

    info!(
        listen_addr = %config.listen_addr,
        model = %config.model_uri,
        quant = %config.quant,
        max_frames = config.session.max_frames,
        "starting beach-surf server"
    );

    run(config, telemetry.metrics_handle()).await
}

async fn run(config: ServerConfig, metrics: PrometheusHandle) -> Result<()> {
    let engine_config = SyntheticEngineConfig {
        n_frames: usize::try_from(config.n_frames).context("n_frames does not fit in memory")?,
        width: config.seed.size.width,
        height: config.seed.size.height,
    };
    let engine = EngineWorker::spawn(move || Ok(SyntheticEngine::new(engine_config)))
        .context("failed to start engine worker thread")?;

    let seeds = Arc::new(
        HttpSeedSource::new(config.seed_fetch_timeout, config.seed.size)
            .context("failed to build seed http client")?,
    );
    let seed = initial_seed(&config.seed, seeds.as_ref()).await?;
    let world = WorldState::new(config.prompt.clone(), seed);
    let encoder = FrameEncoder::new(config.jpeg_quality);

    let ctx = Arc::new(SurfContext::new(
        engine,
        world,
        encoder,
        seeds,
        config.session.clone(),
    ));
    let state = AppState {
        ctx,
        model_uri: config.model_uri.clone(),
        quant: config.quant.clone(),
        metrics: Some(metrics),
    };

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listener")?;
    info!("beach-surf listening on {}", config.listen_addr);

    app::serve(listener, state, shutdown_signal())
        .await
        .context("server shutdown with error")?;

    info!(
        grace_seconds = config.shutdown_grace.as_secs(),
        "shutdown signal received; sleeping for graceful period"
    );
    tokio::time::sleep(config.shutdown_grace).await;
    info!("graceful shutdown complete");
    Ok(())
}

/// Local file first, then URL, then a generated gradient.
async fn initial_seed(config: &SeedConfig, seeds: &dyn SeedSource) -> Result<Frame> {
    if let Some(path) = &config.path {
        let frame = load_seed_file(path, config.size)
            .await
            .with_context(|| format!("failed to load seed image {}", path.display()))?;
        info!(path = %path.display(), "seed frame loaded from file");
        return Ok(frame);
    }
    if let Some(url) = &config.url {
        let frame = seeds
            .fetch(url)
            .await
            .with_context(|| format!("failed to fetch seed image {url}"))?;
        info!(url = %url, "seed frame loaded from url");
        return Ok(frame);
    }
    info!("no seed configured, using generated gradient");
    Ok(Frame::gradient(config.size.width, config.size.height))
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}
