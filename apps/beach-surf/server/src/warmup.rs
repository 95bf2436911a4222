use std::future::Future;
use std::time::{Duration, Instant};

use metrics::histogram;
use tokio::sync::OnceCell;
use tracing::info;

use crate::engine::{ControlInput, EngineError, EngineWorker};
use crate::world::WorldState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupOutcome {
    /// This caller ran the warmup sequence.
    Performed(Duration),
    AlreadyWarm,
}

/// Process-wide gate around the engine's first generation pass.
///
/// The first pass compiles the accelerator graph and must finish before any
/// session reports ready. Concurrent callers wait on the one in flight. A
/// failed warmup leaves the gate closed so the next caller retries.
#[derive(Default)]
pub struct WarmupGate {
    done: OnceCell<Duration>,
}

impl WarmupGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_warm(&self) -> bool {
        self.done.initialized()
    }

    /// Runs reset, seed append, prompt, and one generation the first time it
    /// is called. `on_start` runs only in the caller that performs the work.
    pub async fn ensure_warmed_up<F, Fut>(
        &self,
        engine: &EngineWorker,
        world: &WorldState,
        on_start: F,
    ) -> Result<WarmupOutcome, EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        if self.done.initialized() {
            return Ok(WarmupOutcome::AlreadyWarm);
        }

        let mut performed = None;
        let slot = &mut performed;
        self.done
            .get_or_try_init(|| async move {
                on_start().await;
                let elapsed = run_warmup(engine, world).await?;
                *slot = Some(elapsed);
                Ok::<_, EngineError>(elapsed)
            })
            .await?;

        Ok(match performed {
            Some(elapsed) => WarmupOutcome::Performed(elapsed),
            None => WarmupOutcome::AlreadyWarm,
        })
    }
}

async fn run_warmup(engine: &EngineWorker, world: &WorldState) -> Result<Duration, EngineError> {
    info!("warmup: first client connected, compiling engine generation path");
    let started = Instant::now();

    let step = Instant::now();
    engine.reset().await?;
    info!(step = 1, elapsed_ms = step.elapsed().as_millis() as u64, "warmup: engine reset");

    let step = Instant::now();
    engine.append_frame(world.seed()).await?;
    info!(step = 2, elapsed_ms = step.elapsed().as_millis() as u64, "warmup: seed frame appended");

    let step = Instant::now();
    engine.set_prompt(world.prompt()).await?;
    info!(step = 3, elapsed_ms = step.elapsed().as_millis() as u64, "warmup: prompt set");

    let step = Instant::now();
    engine.generate_frame(ControlInput::idle()).await?;
    info!(step = 4, elapsed_ms = step.elapsed().as_millis() as u64, "warmup: first frame generated");

    let elapsed = started.elapsed();
    histogram!("beach_surf_warmup_ms", elapsed.as_secs_f64() * 1000.0);
    info!(total_ms = elapsed.as_millis() as u64, "warmup complete");
    Ok(elapsed)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::frame::Frame;
    use crate::testing::{EngineOp, RecordingEngine};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn warmup_runs_exactly_once_across_concurrent_callers() {
        let engine = RecordingEngine::new().with_generate_delay(Duration::from_millis(20));
        let log = engine.log();
        let worker = EngineWorker::spawn(move || Ok(engine)).unwrap();
        let world = Arc::new(WorldState::new("dunes", Frame::gradient(4, 2)));
        let gate = Arc::new(WarmupGate::new());
        let starts = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let (worker, world, gate, starts) = (
                worker.clone(),
                Arc::clone(&world),
                Arc::clone(&gate),
                Arc::clone(&starts),
            );
            tasks.push(tokio::spawn(async move {
                gate.ensure_warmed_up(&worker, &world, || async {
                    starts.fetch_add(1, Ordering::SeqCst);
                })
                .await
                .unwrap()
            }));
        }

        let mut performed = 0;
        for task in tasks {
            if let WarmupOutcome::Performed(_) = task.await.unwrap() {
                performed += 1;
            }
        }

        assert_eq!(performed, 1);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert!(gate.is_warm());
        assert_eq!(
            log.ops(),
            vec![
                EngineOp::Reset,
                EngineOp::AppendFrame,
                EngineOp::SetPrompt("dunes".into()),
                EngineOp::Generate,
            ]
        );
    }

    #[tokio::test]
    async fn failed_warmup_leaves_gate_closed() {
        let engine = RecordingEngine::new().failing_generate_after(0);
        let worker = EngineWorker::spawn(move || Ok(engine)).unwrap();
        let world = WorldState::new("dunes", Frame::gradient(4, 2));
        let gate = WarmupGate::new();

        let result = gate.ensure_warmed_up(&worker, &world, || async {}).await;
        assert!(result.is_err());
        assert!(!gate.is_warm());
    }
}
