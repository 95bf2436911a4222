//! Test doubles shared by the unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use async_trait::async_trait;
use beach_surf_core::ServerMessage;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::channel::{ChannelClosed, InboundChannel, OutboundChannel};
use crate::engine::{ControlInput, EngineError, WorldEngine};
use crate::frame::Frame;
use crate::seed::{SeedError, SeedSource};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineOp {
    Reset,
    AppendFrame,
    SetPrompt(String),
    Generate,
}

#[derive(Default)]
struct LogInner {
    ops: Vec<EngineOp>,
    controls: Vec<ControlInput>,
    appended_widths: Vec<u32>,
    threads: HashSet<ThreadId>,
    max_concurrency: usize,
}

#[derive(Clone, Default)]
pub struct OpLog {
    inner: Arc<Mutex<LogInner>>,
    in_flight: Arc<AtomicUsize>,
}

impl OpLog {
    pub fn ops(&self) -> Vec<EngineOp> {
        self.inner.lock().ops.clone()
    }

    pub fn count(&self, op: &EngineOp) -> usize {
        self.inner.lock().ops.iter().filter(|o| *o == op).count()
    }

    pub fn controls(&self) -> Vec<ControlInput> {
        self.inner.lock().controls.clone()
    }

    pub fn appended_widths(&self) -> Vec<u32> {
        self.inner.lock().appended_widths.clone()
    }

    pub fn threads(&self) -> HashSet<ThreadId> {
        self.inner.lock().threads.clone()
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.lock().max_concurrency
    }

    fn enter(&self, op: EngineOp) -> InFlight<'_> {
        let depth = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let mut inner = self.inner.lock();
        inner.ops.push(op);
        inner.threads.insert(std::thread::current().id());
        inner.max_concurrency = inner.max_concurrency.max(depth);
        InFlight(self)
    }
}

struct InFlight<'a>(&'a OpLog);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Engine double that records every call and can be told to misbehave.
pub struct RecordingEngine {
    log: OpLog,
    generated: usize,
    generate_delay: Option<Duration>,
    fail_generate_after: Option<usize>,
    panic_on_generate: bool,
    rejected_prompt: Option<String>,
    resets: usize,
    fail_reset_after: Option<usize>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            log: OpLog::default(),
            generated: 0,
            generate_delay: None,
            fail_generate_after: None,
            panic_on_generate: false,
            rejected_prompt: None,
            resets: 0,
            fail_reset_after: None,
        }
    }

    pub fn log(&self) -> OpLog {
        self.log.clone()
    }

    pub fn with_generate_delay(mut self, delay: Duration) -> Self {
        self.generate_delay = Some(delay);
        self
    }

    /// The first `n` generations succeed, the rest fail.
    pub fn failing_generate_after(mut self, n: usize) -> Self {
        self.fail_generate_after = Some(n);
        self
    }

    pub fn panicking_generate(mut self) -> Self {
        self.panic_on_generate = true;
        self
    }

    /// `set_prompt` fails whenever it is given exactly `prompt`.
    pub fn rejecting_prompt(mut self, prompt: &str) -> Self {
        self.rejected_prompt = Some(prompt.to_string());
        self
    }

    /// The first `n` resets succeed, the rest fail.
    pub fn failing_reset_after(mut self, n: usize) -> Self {
        self.fail_reset_after = Some(n);
        self
    }
}

impl WorldEngine for RecordingEngine {
    fn reset(&mut self) -> Result<(), EngineError> {
        let _guard = self.log.enter(EngineOp::Reset);
        if let Some(limit) = self.fail_reset_after {
            if self.resets >= limit {
                return Err(EngineError::operation("reset", "simulated reset failure"));
            }
        }
        self.resets += 1;
        Ok(())
    }

    fn append_frame(&mut self, frame: &Frame) -> Result<(), EngineError> {
        let _guard = self.log.enter(EngineOp::AppendFrame);
        self.log.inner.lock().appended_widths.push(frame.width());
        Ok(())
    }

    fn set_prompt(&mut self, prompt: &str) -> Result<(), EngineError> {
        let _guard = self.log.enter(EngineOp::SetPrompt(prompt.to_string()));
        match &self.rejected_prompt {
            Some(rejected) if rejected == prompt => {
                Err(EngineError::operation("set_prompt", "prompt rejected"))
            }
            _ => Ok(()),
        }
    }

    fn gen_frame(&mut self, control: &ControlInput) -> Result<Frame, EngineError> {
        let _guard = self.log.enter(EngineOp::Generate);
        self.log.inner.lock().controls.push(control.clone());
        if let Some(delay) = self.generate_delay {
            std::thread::sleep(delay);
        }
        if self.panic_on_generate {
            panic!("simulated engine crash");
        }
        if let Some(limit) = self.fail_generate_after {
            if self.generated >= limit {
                return Err(EngineError::operation("gen_frame", "simulated device error"));
            }
        }
        self.generated += 1;
        Ok(Frame::gradient(4, 2))
    }
}

/// Client end of an in-memory session channel.
pub struct MemoryClient {
    tx: Option<mpsc::UnboundedSender<String>>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryClient {
    pub fn send(&self, text: String) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(text);
        }
    }

    pub fn send_json(&self, value: serde_json::Value) {
        self.send(value.to_string());
    }

    /// Drops the client's sending half, as if the socket closed.
    pub fn disconnect(&mut self) {
        self.tx = None;
    }

    /// Next server message; panics if none arrives within five seconds.
    pub async fn next_message(&mut self) -> ServerMessage {
        self.next_within(Duration::from_secs(5))
            .await
            .expect("expected a server message")
    }

    /// Next server message within `wait`, or `None` on timeout or close.
    pub async fn next_within(&mut self, wait: Duration) -> Option<ServerMessage> {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(text)) => Some(serde_json::from_str(&text).expect("server sent valid json")),
            _ => None,
        }
    }

    /// Waits until the server side has dropped its sender.
    pub async fn closed(&mut self) -> bool {
        matches!(
            tokio::time::timeout(Duration::from_secs(5), self.rx.recv()).await,
            Ok(None)
        )
    }
}

pub struct MemoryInbound {
    rx: mpsc::UnboundedReceiver<String>,
}

pub struct MemoryOutbound {
    tx: Option<mpsc::UnboundedSender<String>>,
}

pub fn memory_channel() -> (MemoryClient, MemoryInbound, MemoryOutbound) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        MemoryClient {
            tx: Some(client_tx),
            rx: client_rx,
        },
        MemoryInbound { rx: server_rx },
        MemoryOutbound {
            tx: Some(server_tx),
        },
    )
}

#[async_trait]
impl InboundChannel for MemoryInbound {
    async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

#[async_trait]
impl OutboundChannel for MemoryOutbound {
    async fn send(&mut self, text: String) -> Result<(), ChannelClosed> {
        match &self.tx {
            Some(tx) => tx.send(text).map_err(|_| ChannelClosed),
            None => Err(ChannelClosed),
        }
    }

    async fn close(&mut self) {
        self.tx = None;
    }
}

/// Seed source that serves a fixed frame, or fails when none is set.
pub struct StaticSeeds {
    frame: Option<Frame>,
    pub requests: Mutex<Vec<String>>,
}

impl StaticSeeds {
    pub fn serving(frame: Frame) -> Self {
        Self {
            frame: Some(frame),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            frame: None,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SeedSource for StaticSeeds {
    async fn fetch(&self, url: &str) -> Result<Frame, SeedError> {
        self.requests.lock().push(url.to_string());
        match &self.frame {
            Some(frame) => Ok(frame.clone()),
            None => Err(SeedError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "seed unavailable",
            ))),
        }
    }
}
