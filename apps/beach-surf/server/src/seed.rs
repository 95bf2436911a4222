//! Seed frame loading: fetch or read an image, then fit it to the engine's
//! input size.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use thiserror::Error;
use tracing::debug;

use crate::frame::{Frame, FrameError};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("seed download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),
    #[error("seed is not a supported image: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("seed normalization task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSize {
    pub width: u32,
    pub height: u32,
}

impl Default for SeedSize {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
        }
    }
}

/// Decodes an encoded image, drops alpha and resizes it with a bilinear filter.
pub fn normalize_seed(bytes: &[u8], size: SeedSize) -> Result<Frame, SeedError> {
    let mut rgb = image::load_from_memory(bytes)?.to_rgb8();
    if rgb.dimensions() != (size.width, size.height) {
        rgb = imageops::resize(&rgb, size.width, size.height, FilterType::Triangle);
    }
    Ok(Frame::from_rgb8(size.width, size.height, rgb.into_raw())?)
}

/// Reads and normalizes a seed image from disk.
pub async fn load_seed_file(path: &Path, size: SeedSize) -> Result<Frame, SeedError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let bytes = std::fs::read(&path)?;
        normalize_seed(&bytes, size)
    })
    .await?
}

/// Where `prompt_with_seed` requests get their replacement seed.
#[async_trait]
pub trait SeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Frame, SeedError>;
}

pub struct HttpSeedSource {
    client: reqwest::Client,
    size: SeedSize,
}

impl HttpSeedSource {
    pub fn new(timeout: Duration, size: SeedSize) -> Result<Self, SeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, size })
    }
}

#[async_trait]
impl SeedSource for HttpSeedSource {
    async fn fetch(&self, url: &str) -> Result<Frame, SeedError> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        debug!(url, bytes = bytes.len(), "seed image downloaded");
        let size = self.size;
        tokio::task::spawn_blocking(move || normalize_seed(&bytes, size)).await?
    }
}
