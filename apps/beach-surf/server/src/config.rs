use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;

use crate::context::SessionSettings;
use crate::encoder::DEFAULT_JPEG_QUALITY;
use crate::seed::SeedSize;
use crate::world::DEFAULT_PROMPT;

#[derive(Debug, Parser)]
#[command(
    name = "beach-surf-server",
    author,
    version,
    about = "Beach Surf real-time world streaming server"
)]
pub struct Cli {
    /// Address to bind the HTTP and websocket listener to.
    #[arg(long, env = "BEACH_SURF_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Model identifier reported by the health endpoint.
    #[arg(
        long,
        env = "BEACH_SURF_MODEL_URI",
        default_value = "Overworld/Waypoint-1-Small"
    )]
    pub model_uri: String,

    /// Quantization mode reported by the health endpoint.
    #[arg(long, env = "BEACH_SURF_QUANT", default_value = "w8a8")]
    pub quant: String,

    /// Engine frame context size.
    #[arg(long, env = "BEACH_SURF_N_FRAMES", default_value_t = 4096)]
    pub n_frames: u64,

    /// Context slots kept free; sessions reset after `n_frames - margin` frames.
    #[arg(long, env = "BEACH_SURF_FRAME_MARGIN", default_value_t = 2)]
    pub frame_margin: u64,

    #[arg(long, env = "BEACH_SURF_JPEG_QUALITY", default_value_t = DEFAULT_JPEG_QUALITY)]
    pub jpeg_quality: u8,

    /// Image URL used as the initial seed frame.
    #[arg(long, env = "BEACH_SURF_SEED_URL")]
    pub seed_url: Option<String>,

    /// Local image used as the initial seed frame. Takes precedence over `--seed-url`.
    #[arg(long, env = "BEACH_SURF_SEED_PATH")]
    pub seed_path: Option<PathBuf>,

    #[arg(long, env = "BEACH_SURF_SEED_WIDTH", default_value_t = 640)]
    pub seed_width: u32,

    #[arg(long, env = "BEACH_SURF_SEED_HEIGHT", default_value_t = 360)]
    pub seed_height: u32,

    /// Default world prompt. Falls back to the built-in scene description.
    #[arg(long, env = "BEACH_SURF_PROMPT")]
    pub prompt: Option<String>,

    /// How long one input drain waits for further messages.
    #[arg(long, env = "BEACH_SURF_COALESCE_WINDOW_MS", default_value_t = 1)]
    pub coalesce_window_ms: u64,

    #[arg(long, env = "BEACH_SURF_SEED_FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub seed_fetch_timeout_secs: u64,

    /// Grace period applied during shutdown.
    #[arg(long, env = "BEACH_SURF_SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace_secs: u64,

    /// Tracing filter directive.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, env = "BEACH_SURF_OTEL_STDOUT", default_value_t = false)]
    pub otel_stdout: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub model_uri: String,
    pub quant: String,
    pub n_frames: u64,
    pub session: SessionSettings,
    pub jpeg_quality: u8,
    pub seed: SeedConfig,
    pub prompt: String,
    pub seed_fetch_timeout: Duration,
    pub shutdown_grace: Duration,
    pub log_filter: String,
    pub otel_stdout: bool,
}

#[derive(Debug, Clone)]
pub struct SeedConfig {
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    pub size: SeedSize,
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;

        if cli.n_frames <= cli.frame_margin {
            bail!(
                "n_frames ({}) must exceed frame_margin ({})",
                cli.n_frames,
                cli.frame_margin
            );
        }
        if !(1..=100).contains(&cli.jpeg_quality) {
            bail!("jpeg_quality must be within 1..=100, got {}", cli.jpeg_quality);
        }
        if cli.seed_width == 0 || cli.seed_height == 0 {
            bail!(
                "seed dimensions must be non-zero, got {}x{}",
                cli.seed_width,
                cli.seed_height
            );
        }
        if cli.coalesce_window_ms == 0 {
            bail!("coalesce_window_ms must be non-zero");
        }

        let session = SessionSettings {
            poll_window: Duration::from_millis(cli.coalesce_window_ms),
            ..SessionSettings::for_capacity(cli.n_frames, cli.frame_margin)
        };
        let prompt = cli
            .prompt
            .map(|prompt| prompt.trim().to_string())
            .filter(|prompt| !prompt.is_empty())
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string());

        Ok(ServerConfig {
            listen_addr,
            model_uri: cli.model_uri,
            quant: cli.quant,
            n_frames: cli.n_frames,
            session,
            jpeg_quality: cli.jpeg_quality,
            seed: SeedConfig {
                path: cli.seed_path,
                url: cli.seed_url.filter(|url| !url.trim().is_empty()),
                size: SeedSize {
                    width: cli.seed_width,
                    height: cli.seed_height,
                },
            },
            prompt,
            seed_fetch_timeout: Duration::from_secs(cli.seed_fetch_timeout_secs),
            shutdown_grace: Duration::from_secs(cli.shutdown_grace_secs),
            log_filter: cli.log_filter,
            otel_stdout: cli.otel_stdout,
        })
    }
}
