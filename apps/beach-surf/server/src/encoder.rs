use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageError};
use thiserror::Error;

use crate::frame::Frame;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("jpeg encoding failed: {0}")]
    Jpeg(#[from] ImageError),
}

/// Compresses frames to JPEG at a fixed quality. Holds no state between
/// calls, so copies can be moved onto blocking threads freely.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    quality: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>, EncodeError> {
        let samples = frame.to_rgb8();
        let mut buf = Vec::with_capacity(samples.len() / 8);
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, self.quality);
        encoder.encode(&samples, frame.width(), frame.height(), ColorType::Rgb8)?;
        Ok(buf)
    }
}
