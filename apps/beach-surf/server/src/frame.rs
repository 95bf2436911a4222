use std::borrow::Cow;

use thiserror::Error;

/// Interleaved RGB samples, either already quantized or straight from the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Pixels {
    U8(Vec<u8>),
    F32(Vec<f32>),
}

/// Three-channel image buffer exchanged with the engine and the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Pixels,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame buffer holds {actual} samples, expected {expected} for {width}x{height} RGB")]
    LengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

impl Frame {
    pub fn from_rgb8(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        check_len(width, height, data.len())?;
        Ok(Self {
            width,
            height,
            pixels: Pixels::U8(data),
        })
    }

    pub fn from_rgb_f32(width: u32, height: u32, data: Vec<f32>) -> Result<Self, FrameError> {
        check_len(width, height, data.len())?;
        Ok(Self {
            width,
            height,
            pixels: Pixels::F32(data),
        })
    }

    /// Vertical RGB gradient used when no seed image is configured.
    pub fn gradient(width: u32, height: u32) -> Self {
        let mut data = Vec::with_capacity(sample_count(width, height));
        for y in 0..height {
            let shade = (if height > 1 { y * 255 / (height - 1) } else { 0 }) as u8;
            for x in 0..width {
                let across = (if width > 1 { x * 255 / (width - 1) } else { 0 }) as u8;
                data.extend_from_slice(&[across / 2, shade / 2 + 64, 255 - shade / 2]);
            }
        }
        Self {
            width,
            height,
            pixels: Pixels::U8(data),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_rgb8(&self) -> bool {
        matches!(self.pixels, Pixels::U8(_))
    }

    /// Samples as bytes. Non-integer buffers are clamped to `[0, 255]` and
    /// truncated; integer buffers are borrowed as-is.
    pub fn to_rgb8(&self) -> Cow<'_, [u8]> {
        match &self.pixels {
            Pixels::U8(data) => Cow::Borrowed(data),
            Pixels::F32(data) => Cow::Owned(data.iter().copied().map(quantize).collect()),
        }
    }

    /// Returns an integer-sample copy of the frame.
    pub fn clamped(&self) -> Frame {
        Frame {
            width: self.width,
            height: self.height,
            pixels: Pixels::U8(self.to_rgb8().into_owned()),
        }
    }
}

pub(crate) fn sample_count(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

fn check_len(width: u32, height: u32, actual: usize) -> Result<(), FrameError> {
    let expected = sample_count(width, height);
    if expected != actual {
        return Err(FrameError::LengthMismatch {
            width,
            height,
            expected,
            actual,
        });
    }
    Ok(())
}

fn quantize(sample: f32) -> u8 {
    // NaN clamps to 0.
    if sample.is_nan() {
        return 0;
    }
    sample.clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffers() {
        let err = Frame::from_rgb8(2, 2, vec![0; 11]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::LengthMismatch {
                expected: 12,
                actual: 11,
                ..
            }
        ));
        assert!(Frame::from_rgb_f32(1, 1, vec![0.0; 4]).is_err());
    }

    #[test]
    fn float_samples_clamp_and_truncate() {
        let frame =
            Frame::from_rgb_f32(2, 1, vec![-4.0, 0.9, 127.99, 255.0, 300.5, f32::NAN]).unwrap();
        assert_eq!(frame.to_rgb8().as_ref(), &[0, 0, 127, 255, 255, 0]);
    }

    #[test]
    fn clamping_is_idempotent() {
        let frame = Frame::from_rgb_f32(1, 2, vec![512.0, -1.0, 64.5, 3.3, 254.9, 1e9]).unwrap();
        let once = frame.clamped();
        let twice = once.clamped();
        assert!(once.is_rgb8());
        assert_eq!(once, twice);
    }

    #[test]
    fn integer_frames_borrow_their_buffer() {
        let frame = Frame::from_rgb8(1, 1, vec![1, 2, 3]).unwrap();
        assert!(matches!(frame.to_rgb8(), Cow::Borrowed(_)));
    }

    #[test]
    fn gradient_has_expected_shape() {
        let frame = Frame::gradient(8, 4);
        assert_eq!(frame.to_rgb8().len(), 8 * 4 * 3);
        assert!(frame.is_rgb8());
    }
}
