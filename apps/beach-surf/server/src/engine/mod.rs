//! The world-model engine boundary.
//!
//! The engine is stateful, blocking and bound to the execution context it was
//! created on. Everything outside this module talks to it through
//! [`EngineWorker`], which owns the engine on one dedicated thread.

mod synthetic;
mod worker;

use std::collections::BTreeSet;

use beach_surf_core::{button_codes, ControlMessage};
use thiserror::Error;

use crate::frame::Frame;

pub use synthetic::{SyntheticEngine, SyntheticEngineConfig};
pub use worker::EngineWorker;

/// Per-step input fed to [`WorldEngine::gen_frame`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlInput {
    pub buttons: BTreeSet<u8>,
    pub mouse: (f32, f32),
}

impl ControlInput {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn from_message(message: &ControlMessage) -> Self {
        Self {
            buttons: button_codes(&message.buttons).into_iter().collect(),
            mouse: (message.mouse_dx as f32, message.mouse_dy as f32),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("engine {op} failed: {message}")]
    Operation { op: &'static str, message: String },
    #[error("engine panicked during {op}: {message}")]
    Panicked { op: &'static str, message: String },
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("engine worker stopped")]
    WorkerStopped,
}

impl EngineError {
    pub fn operation(op: &'static str, message: impl Into<String>) -> Self {
        EngineError::Operation {
            op,
            message: message.into(),
        }
    }
}

/// A generative engine that produces one frame per control step.
///
/// All methods block. Implementations may assume they are only ever called
/// from the thread that constructed them.
pub trait WorldEngine: 'static {
    fn reset(&mut self) -> Result<(), EngineError>;
    fn append_frame(&mut self, frame: &Frame) -> Result<(), EngineError>;
    fn set_prompt(&mut self, prompt: &str) -> Result<(), EngineError>;
    fn gen_frame(&mut self, control: &ControlInput) -> Result<Frame, EngineError>;
}

impl<E: WorldEngine + ?Sized> WorldEngine for Box<E> {
    fn reset(&mut self) -> Result<(), EngineError> {
        (**self).reset()
    }

    fn append_frame(&mut self, frame: &Frame) -> Result<(), EngineError> {
        (**self).append_frame(frame)
    }

    fn set_prompt(&mut self, prompt: &str) -> Result<(), EngineError> {
        (**self).set_prompt(prompt)
    }

    fn gen_frame(&mut self, control: &ControlInput) -> Result<Frame, EngineError> {
        (**self).gen_frame(control)
    }
}
