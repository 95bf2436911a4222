use std::sync::Arc;

use parking_lot::Mutex;

use crate::frame::Frame;

pub const DEFAULT_PROMPT: &str = "First-person shooter gameplay footage from a true POV perspective, \
the camera locked to the player's eyes as assault rifles, carbines, machine guns, laser-sighted \
firearms, bullet-fed weapons, magazines, barrels, muzzles, tracers, ammo, and launchers dominate \
the frame, with constant gun handling, recoil, muzzle flash, shell ejection, and ballistic impacts. \
Continuous real-time FPS motion with no cuts, weapon-centric framing, realistic gun physics, \
authentic firearm materials, high-caliber ammunition, laser optics, iron sights, and relentless \
gun-driven action, rendered in ultra-realistic 4K at 60fps.";

/// Prompt and seed frame shared by every session.
///
/// Last writer wins: a prompt or seed change from one client is picked up by
/// the next reset of any session.
pub struct WorldState {
    default_prompt: String,
    inner: Mutex<WorldInner>,
}

struct WorldInner {
    prompt: String,
    seed: Arc<Frame>,
}

impl WorldState {
    pub fn new(default_prompt: impl Into<String>, seed: Frame) -> Self {
        let default_prompt = default_prompt.into();
        Self {
            inner: Mutex::new(WorldInner {
                prompt: default_prompt.clone(),
                seed: Arc::new(seed),
            }),
            default_prompt,
        }
    }

    pub fn prompt(&self) -> String {
        self.inner.lock().prompt.clone()
    }

    pub fn seed(&self) -> Arc<Frame> {
        Arc::clone(&self.inner.lock().seed)
    }

    /// Trims `raw` and stores it, falling back to the default prompt when
    /// nothing is left. Returns the stored prompt.
    pub fn replace_prompt(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        let prompt = if trimmed.is_empty() {
            self.default_prompt.clone()
        } else {
            trimmed.to_string()
        };
        self.inner.lock().prompt = prompt.clone();
        prompt
    }

    pub fn replace_seed(&self, seed: Frame) {
        self.inner.lock().seed = Arc::new(seed);
    }
}
