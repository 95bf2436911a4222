use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::{ControlInput, EngineError, WorldEngine};
use crate::frame::Frame;

const WORKER_THREAD_NAME: &str = "beach-surf-engine";

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

enum EngineCommand {
    Reset(Reply<()>),
    AppendFrame { frame: Arc<Frame>, reply: Reply<()> },
    SetPrompt { prompt: String, reply: Reply<()> },
    Generate { control: ControlInput, reply: Reply<Frame> },
}

impl EngineCommand {
    fn execute<E: WorldEngine>(self, engine: &mut E) {
        // A dropped receiver means the session went away mid-flight; the
        // result is discarded.
        match self {
            EngineCommand::Reset(reply) => {
                let _ = reply.send(guarded("reset", || engine.reset()));
            }
            EngineCommand::AppendFrame { frame, reply } => {
                let _ = reply.send(guarded("append_frame", || engine.append_frame(&frame)));
            }
            EngineCommand::SetPrompt { prompt, reply } => {
                let _ = reply.send(guarded("set_prompt", || engine.set_prompt(&prompt)));
            }
            EngineCommand::Generate { control, reply } => {
                let _ = reply.send(guarded("gen_frame", || engine.gen_frame(&control)));
            }
        }
    }

    fn reject(self, err: EngineError) {
        match self {
            EngineCommand::Reset(reply) => {
                let _ = reply.send(Err(err));
            }
            EngineCommand::AppendFrame { reply, .. } | EngineCommand::SetPrompt { reply, .. } => {
                let _ = reply.send(Err(err));
            }
            EngineCommand::Generate { reply, .. } => {
                let _ = reply.send(Err(err));
            }
        }
    }
}

/// Handle to the thread that owns the engine.
///
/// Every operation is queued on one unbounded FIFO and executed by a single
/// dedicated OS thread, so engine calls never overlap and always run on the
/// context that created the engine. Callers await the reply without blocking
/// the runtime. Clones share the same worker.
#[derive(Clone)]
pub struct EngineWorker {
    tx: mpsc::UnboundedSender<EngineCommand>,
    loaded: Arc<AtomicBool>,
}

impl EngineWorker {
    /// Starts the worker thread and builds the engine on it.
    ///
    /// Returns immediately; commands submitted while the engine is loading
    /// queue behind the load. If the factory fails, every command is answered
    /// with [`EngineError::Unavailable`].
    pub fn spawn<F, E>(factory: F) -> std::io::Result<Self>
    where
        F: FnOnce() -> Result<E, EngineError> + Send + 'static,
        E: WorldEngine,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let loaded = Arc::new(AtomicBool::new(false));
        let worker_loaded = Arc::clone(&loaded);
        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || run_worker(factory, rx, worker_loaded))?;
        Ok(Self { tx, loaded })
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub async fn reset(&self) -> Result<(), EngineError> {
        self.call(EngineCommand::Reset).await
    }

    pub async fn append_frame(&self, frame: Arc<Frame>) -> Result<(), EngineError> {
        self.call(|reply| EngineCommand::AppendFrame { frame, reply })
            .await
    }

    pub async fn set_prompt(&self, prompt: impl Into<String>) -> Result<(), EngineError> {
        let prompt = prompt.into();
        self.call(|reply| EngineCommand::SetPrompt { prompt, reply })
            .await
    }

    pub async fn generate_frame(&self, control: ControlInput) -> Result<Frame, EngineError> {
        self.call(|reply| EngineCommand::Generate { control, reply })
            .await
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> EngineCommand,
    ) -> Result<T, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| EngineError::WorkerStopped)?;
        rx.await.map_err(|_| EngineError::WorkerStopped)?
    }
}

fn run_worker<F, E>(
    factory: F,
    mut rx: mpsc::UnboundedReceiver<EngineCommand>,
    loaded: Arc<AtomicBool>,
) where
    F: FnOnce() -> Result<E, EngineError>,
    E: WorldEngine,
{
    let started = Instant::now();
    let engine = match catch_unwind(AssertUnwindSafe(factory)) {
        Ok(Ok(engine)) => {
            loaded.store(true, Ordering::Release);
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "engine loaded"
            );
            Ok(engine)
        }
        Ok(Err(err)) => {
            error!(error = %err, "engine failed to load");
            Err(err.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(error = %message, "engine panicked while loading");
            Err(message)
        }
    };

    match engine {
        Ok(mut engine) => {
            while let Some(command) = rx.blocking_recv() {
                command.execute(&mut engine);
            }
        }
        Err(reason) => {
            while let Some(command) = rx.blocking_recv() {
                command.reject(EngineError::Unavailable(reason.clone()));
            }
        }
    }
    debug!("engine worker exiting");
}

fn guarded<T>(
    op: &'static str,
    f: impl FnOnce() -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(op, error = %message, "engine panicked");
            Err(EngineError::Panicked { op, message })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EngineOp, RecordingEngine};

    #[tokio::test]
    async fn operations_run_in_submission_order() {
        let engine = RecordingEngine::new();
        let log = engine.log();
        let worker = EngineWorker::spawn(move || Ok(engine)).unwrap();

        worker.reset().await.unwrap();
        worker
            .append_frame(Arc::new(Frame::gradient(4, 2)))
            .await
            .unwrap();
        worker.set_prompt("canyon").await.unwrap();
        worker.generate_frame(ControlInput::idle()).await.unwrap();

        assert_eq!(
            log.ops(),
            vec![
                EngineOp::Reset,
                EngineOp::AppendFrame,
                EngineOp::SetPrompt("canyon".into()),
                EngineOp::Generate,
            ]
        );
        assert!(worker.is_loaded());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_thread_without_overlap() {
        let engine = RecordingEngine::new().with_generate_delay(std::time::Duration::from_millis(1));
        let log = engine.log();
        let worker = EngineWorker::spawn(move || Ok(engine)).unwrap();
        worker
            .append_frame(Arc::new(Frame::gradient(4, 2)))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let worker = worker.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..10 {
                    worker.generate_frame(ControlInput::idle()).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(log.count(&EngineOp::Generate), 80);
        assert_eq!(log.max_concurrency(), 1);
        let threads = log.threads();
        assert_eq!(threads.len(), 1);
        assert_ne!(
            threads.into_iter().next(),
            Some(std::thread::current().id())
        );
    }

    #[tokio::test]
    async fn errors_reach_the_caller_and_worker_survives() {
        let engine = RecordingEngine::new().rejecting_prompt("anything");
        let worker = EngineWorker::spawn(move || Ok(engine)).unwrap();

        let err = worker.set_prompt("anything").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Operation { op: "set_prompt", ref message } if message == "prompt rejected"
        ));
        worker.reset().await.expect("worker still serving");
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let engine = RecordingEngine::new().panicking_generate();
        let worker = EngineWorker::spawn(move || Ok(engine)).unwrap();

        let err = worker.generate_frame(ControlInput::idle()).await.unwrap_err();
        assert!(matches!(err, EngineError::Panicked { op: "gen_frame", .. }));
        worker.reset().await.expect("worker still serving");
    }

    #[tokio::test]
    async fn failed_load_rejects_commands() {
        let worker = EngineWorker::spawn(|| -> Result<RecordingEngine, EngineError> {
            Err(EngineError::operation("load", "weights missing"))
        })
        .unwrap();

        let err = worker.reset().await.unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(ref reason) if reason.contains("weights missing")));
        assert!(!worker.is_loaded());
    }
}
