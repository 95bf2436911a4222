//! Per-connection lifecycle: connect, warm up, stream frames, reset, close.

use std::sync::Arc;
use std::time::Instant;

use beach_surf_core::{ClientMessage, ControlMessage, ServerMessage, StatusCode};
use metrics::{counter, histogram};
use tracing::{debug, error, info, warn};

use crate::channel::{InboundChannel, OutboundChannel};
use crate::coalesce::ControlCoalescer;
use crate::context::SurfContext;
use crate::engine::ControlInput;
use crate::error::SessionError;
use crate::frame::Frame;
use crate::protocol::{encode_server_message, frame_message};
use crate::warmup::WarmupOutcome;

/// Frames between periodic progress log lines.
const LOG_EVERY_FRAMES: u64 = 60;

/// Connect-sequence progress. A session only generates frames once `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Init,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    Explicit,
    Prompt,
    Seed,
    Capacity,
}

impl ResetReason {
    pub fn label(self) -> &'static str {
        match self {
            ResetReason::Explicit => "explicit",
            ResetReason::Prompt => "prompt",
            ResetReason::Seed => "seed",
            ResetReason::Capacity => "capacity",
        }
    }
}

/// Frame bookkeeping for one connection.
#[derive(Debug, Clone)]
pub struct Session {
    frame_count: u64,
    max_frames: u64,
    paused: bool,
    phase: SessionPhase,
}

impl Session {
    pub fn new(max_frames: u64) -> Self {
        Self {
            frame_count: 0,
            max_frames,
            paused: false,
            phase: SessionPhase::Init,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// True when the next generation must be preceded by an automatic reset.
    pub fn at_capacity(&self) -> bool {
        self.frame_count >= self.max_frames
    }

    /// Counts a generated frame and returns its id.
    fn record_frame(&mut self) -> u64 {
        self.frame_count += 1;
        self.frame_count
    }

    fn mark_reset(&mut self) {
        self.frame_count = 0;
    }

    fn enter(&mut self, phase: SessionPhase, peer: &str) {
        debug!(peer, from = ?self.phase, to = ?phase, "session phase change");
        self.phase = phase;
    }
}

/// How a session ended.
#[derive(Debug)]
pub struct SessionEnd {
    pub frame_count: u64,
    /// Furthest point of the connect sequence the session reached.
    pub phase: SessionPhase,
    /// `None` for a clean client disconnect.
    pub error: Option<SessionError>,
}

/// Drives one client from connect to close. Never panics on client or engine
/// misbehaviour; the outcome is returned instead.
pub async fn run_session<I, O>(
    ctx: Arc<SurfContext>,
    inbound: I,
    outbound: O,
    peer: String,
) -> SessionEnd
where
    I: InboundChannel,
    O: OutboundChannel,
{
    let coalescer = ControlCoalescer::new(inbound, ctx.settings.poll_window);
    let mut driver = SessionDriver {
        session: Session::new(ctx.settings.max_frames),
        ctx,
        coalescer,
        outbound,
        peer,
    };

    driver.ctx.session_opened();
    let result = driver.run().await;
    driver.ctx.session_closed();
    driver.finish(result).await
}

struct SessionDriver<I, O> {
    ctx: Arc<SurfContext>,
    coalescer: ControlCoalescer<I>,
    outbound: O,
    session: Session,
    peer: String,
}

impl<I, O> SessionDriver<I, O>
where
    I: InboundChannel,
    O: OutboundChannel,
{
    async fn run(&mut self) -> Result<(), SessionError> {
        self.warm_up().await?;
        self.start().await?;
        self.control_loop().await
    }

    async fn warm_up(&mut self) -> Result<(), SessionError> {
        let ctx = Arc::clone(&self.ctx);
        let outbound = &mut self.outbound;
        let peer = self.peer.as_str();
        let outcome = ctx
            .warmup
            .ensure_warmed_up(&ctx.engine, &ctx.world, || async move {
                info!(peer, "first client connected, warming up engine");
                // A client that leaves mid-warmup is noticed on the next send.
                let _ = send_message(outbound, &ServerMessage::status(StatusCode::Warmup)).await;
            })
            .await?;
        if let WarmupOutcome::Performed(elapsed) = outcome {
            info!(
                peer = %self.peer,
                elapsed_ms = elapsed.as_millis() as u64,
                "warmup finished"
            );
        }
        Ok(())
    }

    async fn start(&mut self) -> Result<(), SessionError> {
        self.send(ServerMessage::status(StatusCode::Init)).await?;
        debug!(peer = %self.peer, "resetting engine for new session");
        self.ctx.engine.reset().await?;

        self.session.enter(SessionPhase::Loading, &self.peer);
        self.send(ServerMessage::status(StatusCode::Loading)).await?;
        let seed = self.ctx.world.seed();
        self.ctx.engine.append_frame(Arc::clone(&seed)).await?;

        // Frame 0 is the seed so the client has something to show.
        let jpeg = self.encode(seed).await?;
        self.send(frame_message(&jpeg, 0, 0.0, 0.0)).await?;

        self.session.enter(SessionPhase::Ready, &self.peer);
        self.send(ServerMessage::status(StatusCode::Ready)).await?;
        info!(peer = %self.peer, "ready for control loop");
        Ok(())
    }

    async fn control_loop(&mut self) -> Result<(), SessionError> {
        loop {
            let Some(actionable) = self.coalescer.next_actionable().await? else {
                continue;
            };
            self.handle(actionable.message).await?;
        }
    }

    async fn handle(&mut self, message: ClientMessage) -> Result<(), SessionError> {
        match message {
            ClientMessage::Control(control) => self.step(control).await,
            ClientMessage::Reset => {
                info!(peer = %self.peer, "reset requested");
                self.reset(ResetReason::Explicit).await
            }
            ClientMessage::Pause => {
                self.session.paused = true;
                info!(peer = %self.peer, "paused");
                Ok(())
            }
            ClientMessage::Resume => {
                self.session.paused = false;
                info!(peer = %self.peer, "resumed");
                Ok(())
            }
            ClientMessage::Prompt { prompt } => {
                let applied = self.ctx.world.replace_prompt(&prompt);
                info!(peer = %self.peer, prompt = %preview(&applied), "prompt received");
                self.reset(ResetReason::Prompt).await
            }
            ClientMessage::PromptWithSeed { prompt, seed_url } => {
                let url = seed_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|url| !url.is_empty());
                if let Some(url) = url {
                    match self.ctx.seeds.fetch(url).await {
                        Ok(seed) => {
                            self.ctx.world.replace_seed(seed);
                            info!(peer = %self.peer, url, "seed frame loaded from url");
                        }
                        Err(err) => {
                            counter!("beach_surf_seed_fetch_failures_total", 1);
                            warn!(
                                peer = %self.peer,
                                url,
                                error = %err,
                                "seed fetch failed, keeping previous seed"
                            );
                        }
                    }
                }
                let applied = self.ctx.world.replace_prompt(&prompt);
                info!(peer = %self.peer, prompt = %preview(&applied), "prompt with seed received");
                self.reset(ResetReason::Seed).await
            }
        }
    }

    async fn step(&mut self, control: ControlMessage) -> Result<(), SessionError> {
        if self.session.paused {
            return Ok(());
        }
        if self.session.at_capacity() {
            info!(
                peer = %self.peer,
                max_frames = self.session.max_frames,
                "auto-reset at frame limit"
            );
            self.reset(ResetReason::Capacity).await?;
        }

        let input = ControlInput::from_message(&control);
        let started = Instant::now();
        let frame = self.ctx.engine.generate_frame(input.clone()).await?;
        let gen_ms = started.elapsed().as_secs_f64() * 1000.0;
        let frame_id = self.session.record_frame();
        counter!("beach_surf_frames_generated_total", 1);
        histogram!("beach_surf_generation_ms", gen_ms);

        let jpeg = self.encode(Arc::new(frame)).await?;
        self.send(frame_message(&jpeg, frame_id, control.ts, gen_ms))
            .await?;

        if frame_id % LOG_EVERY_FRAMES == 0 {
            info!(
                peer = %self.peer,
                frame_id,
                buttons = ?input.buttons,
                mouse = ?input.mouse,
                gen_ms,
                "sent frame"
            );
        }
        Ok(())
    }

    /// Reset, re-append the current seed, re-apply the current prompt.
    async fn reset(&mut self, reason: ResetReason) -> Result<(), SessionError> {
        self.ctx.engine.reset().await?;
        self.ctx.engine.append_frame(self.ctx.world.seed()).await?;
        self.ctx.engine.set_prompt(self.ctx.world.prompt()).await?;
        self.session.mark_reset();
        counter!("beach_surf_resets_total", 1, "reason" => reason.label());
        self.send(ServerMessage::status(StatusCode::Reset)).await?;
        info!(peer = %self.peer, reason = reason.label(), "engine reset");
        Ok(())
    }

    async fn encode(&self, frame: Arc<Frame>) -> Result<Vec<u8>, SessionError> {
        let encoder = self.ctx.encoder;
        let jpeg = tokio::task::spawn_blocking(move || encoder.encode(&frame)).await??;
        Ok(jpeg)
    }

    async fn send(&mut self, message: ServerMessage) -> Result<(), SessionError> {
        send_message(&mut self.outbound, &message).await
    }

    async fn finish(mut self, result: Result<(), SessionError>) -> SessionEnd {
        let frame_count = self.session.frame_count();
        let phase = self.session.phase();
        let superseded = self.coalescer.superseded_total();
        let error = match result {
            Ok(()) | Err(SessionError::Disconnected) => {
                info!(
                    peer = %self.peer,
                    frames = frame_count,
                    superseded,
                    phase = ?phase,
                    "client disconnected"
                );
                None
            }
            Err(err) => {
                error!(
                    peer = %self.peer,
                    frames = frame_count,
                    superseded,
                    phase = ?phase,
                    error = %err,
                    "session failed"
                );
                if err.should_notify() {
                    let _ = self.send(ServerMessage::error(err.to_string())).await;
                }
                Some(err)
            }
        };
        self.outbound.close().await;
        SessionEnd {
            frame_count,
            phase,
            error,
        }
    }
}

async fn send_message<O: OutboundChannel>(
    outbound: &mut O,
    message: &ServerMessage,
) -> Result<(), SessionError> {
    let text = encode_server_message(message)?;
    outbound.send(text).await?;
    Ok(())
}

fn preview(prompt: &str) -> String {
    const LIMIT: usize = 50;
    match prompt.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &prompt[..cut]),
        None => prompt.to_string(),
    }
}
