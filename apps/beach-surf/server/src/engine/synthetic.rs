use tracing::debug;

use super::{ControlInput, EngineError, WorldEngine};
use crate::frame::{sample_count, Frame};

#[derive(Debug, Clone, Copy)]
pub struct SyntheticEngineConfig {
    /// Context capacity in frames, seed included.
    pub n_frames: usize,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticEngineConfig {
    fn default() -> Self {
        Self {
            n_frames: 4096,
            width: 640,
            height: 360,
        }
    }
}

/// CPU stand-in for the diffusion engine.
///
/// It keeps the contract the scheduler relies on: a seed frame must be
/// appended before generating, and output is float samples that still need
/// clamping. The frame context holds at most `n_frames` entries and evicts
/// the oldest when full, so sessions sharing the engine never starve each
/// other. Each generated frame scrolls the previous one by the mouse delta
/// and brightens it per pressed button.
pub struct SyntheticEngine {
    config: SyntheticEngineConfig,
    context_len: usize,
    last: Option<Vec<f32>>,
    tint: f32,
}

impl SyntheticEngine {
    pub fn new(config: SyntheticEngineConfig) -> Self {
        Self {
            config,
            context_len: 0,
            last: None,
            tint: 0.0,
        }
    }

    /// Number of frames currently held in the context window.
    pub fn context_len(&self) -> usize {
        self.context_len
    }

    fn push_context(&mut self) {
        if self.context_len < self.config.n_frames {
            self.context_len += 1;
        } else {
            debug!(n_frames = self.config.n_frames, "frame context full, evicting oldest");
        }
    }
}

impl WorldEngine for SyntheticEngine {
    fn reset(&mut self) -> Result<(), EngineError> {
        self.context_len = 0;
        self.last = None;
        Ok(())
    }

    fn append_frame(&mut self, frame: &Frame) -> Result<(), EngineError> {
        if frame.width() != self.config.width || frame.height() != self.config.height {
            return Err(EngineError::operation(
                "append_frame",
                format!(
                    "expected {}x{} frame, got {}x{}",
                    self.config.width,
                    self.config.height,
                    frame.width(),
                    frame.height()
                ),
            ));
        }
        self.push_context();
        self.last = Some(frame.to_rgb8().iter().map(|s| *s as f32).collect());
        Ok(())
    }

    fn set_prompt(&mut self, prompt: &str) -> Result<(), EngineError> {
        self.tint = prompt_tint(prompt);
        debug!(tint = self.tint, "synthetic engine prompt applied");
        Ok(())
    }

    fn gen_frame(&mut self, control: &ControlInput) -> Result<Frame, EngineError> {
        let Some(previous) = self.last.as_ref() else {
            return Err(EngineError::operation("gen_frame", "no seed frame appended"));
        };
        let (width, height) = (self.config.width as i64, self.config.height as i64);
        let shift_x = wrap_shift(control.mouse.0, width);
        let shift_y = wrap_shift(control.mouse.1, height);
        let gain = 1.0 + 0.02 * control.buttons.len() as f32;

        let mut next = vec![0.0f32; sample_count(self.config.width, self.config.height)];
        for y in 0..height {
            let src_y = (y + shift_y).rem_euclid(height);
            for x in 0..width {
                let src_x = (x + shift_x).rem_euclid(width);
                let src = ((src_y * width + src_x) * 3) as usize;
                let dst = ((y * width + x) * 3) as usize;
                next[dst] = previous[src] * gain;
                next[dst + 1] = previous[src + 1] * gain;
                next[dst + 2] = previous[src + 2] * gain + self.tint;
            }
        }

        self.push_context();
        let frame = Frame::from_rgb_f32(self.config.width, self.config.height, next)
            .map_err(|err| EngineError::operation("gen_frame", err.to_string()))?;
        // Feed back the quantized frame so brightness saturates instead of growing.
        self.last = Some(frame.to_rgb8().iter().map(|s| *s as f32).collect());
        Ok(frame)
    }
}

/// Scroll offset in `[0, extent)`. Non-finite deltas do not scroll.
fn wrap_shift(delta: f32, extent: i64) -> i64 {
    if !delta.is_finite() {
        return 0;
    }
    // `as` saturates, so huge deltas stay in range before the modulo.
    (delta.round() as i64).rem_euclid(extent)
}

/// Small per-prompt blue shift in `[-3, 3]`.
fn prompt_tint(prompt: &str) -> f32 {
    // FNV-1a
    let hash = prompt
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |acc, byte| {
            (acc ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
        });
    (hash % 7) as f32 - 3.0
}
