use thiserror::Error;

use crate::channel::ChannelClosed;
use crate::coalesce::Disconnected;
use crate::encoder::EncodeError;
use crate::engine::EngineError;

/// Why a session stopped.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("client disconnected")]
    Disconnected,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("failed to encode outbound message: {0}")]
    Protocol(#[from] serde_json::Error),
    #[error("frame encoding task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SessionError {
    /// Whether the client should be told about this error before closing.
    pub fn should_notify(&self) -> bool {
        !matches!(self, SessionError::Disconnected)
    }
}

impl From<Disconnected> for SessionError {
    fn from(_: Disconnected) -> Self {
        SessionError::Disconnected
    }
}

impl From<ChannelClosed> for SessionError {
    fn from(_: ChannelClosed) -> Self {
        SessionError::Disconnected
    }
}
