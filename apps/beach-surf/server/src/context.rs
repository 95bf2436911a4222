use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;

use crate::coalesce::DEFAULT_POLL_WINDOW;
use crate::encoder::FrameEncoder;
use crate::engine::EngineWorker;
use crate::seed::SeedSource;
use crate::warmup::WarmupGate;
use crate::world::WorldState;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Frames a session may generate before an automatic reset.
    pub max_frames: u64,
    /// How long a coalescing drain waits for further input.
    pub poll_window: Duration,
}

impl SessionSettings {
    /// Leaves `margin` slots of the engine's frame context unused.
    pub fn for_capacity(n_frames: u64, margin: u64) -> Self {
        Self {
            max_frames: n_frames.saturating_sub(margin),
            poll_window: DEFAULT_POLL_WINDOW,
        }
    }
}

/// Everything sessions share: the engine worker, the warmup gate and the
/// prompt/seed holder. Passed explicitly to every session.
pub struct SurfContext {
    pub engine: EngineWorker,
    pub warmup: WarmupGate,
    pub world: WorldState,
    pub encoder: FrameEncoder,
    pub seeds: Arc<dyn SeedSource>,
    pub settings: SessionSettings,
    active_sessions: AtomicUsize,
}

impl SurfContext {
    pub fn new(
        engine: EngineWorker,
        world: WorldState,
        encoder: FrameEncoder,
        seeds: Arc<dyn SeedSource>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            engine,
            warmup: WarmupGate::new(),
            world,
            encoder,
            seeds,
            settings,
            active_sessions: AtomicUsize::new(0),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    pub(crate) fn session_opened(&self) {
        let active = self.active_sessions.fetch_add(1, Ordering::Relaxed) + 1;
        gauge!("beach_surf_sessions_active", active as f64);
    }

    pub(crate) fn session_closed(&self) {
        let active = self.active_sessions.fetch_sub(1, Ordering::Relaxed) - 1;
        gauge!("beach_surf_sessions_active", active as f64);
    }
}
