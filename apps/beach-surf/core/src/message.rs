use serde::{Deserialize, Serialize};

/// Lifecycle codes reported to the client. The client maps them to display text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// Engine is resetting for a new connection.
    Init,
    /// Seed frame is being loaded into the engine.
    Loading,
    /// Control loop is running.
    Ready,
    /// Engine state was reset (explicitly, by a prompt change, or at capacity).
    Reset,
    /// First connection is compiling the engine's generation path.
    Warmup,
}

/// One step of player input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(default)]
    pub buttons: Vec<String>,
    #[serde(default)]
    pub mouse_dx: f64,
    #[serde(default)]
    pub mouse_dy: f64,
    /// Client timestamp, echoed back on the generated frame.
    #[serde(default)]
    pub ts: f64,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Control(ControlMessage),
    Reset,
    Pause,
    Resume,
    /// Replace the prompt and reset. Blank prompts fall back to the default.
    Prompt {
        #[serde(default)]
        prompt: String,
    },
    /// Replace the prompt, optionally swap the seed frame, and reset.
    PromptWithSeed {
        #[serde(default)]
        prompt: String,
        #[serde(default)]
        seed_url: Option<String>,
    },
}

impl ClientMessage {
    pub fn is_control(&self) -> bool {
        matches!(self, ClientMessage::Control(_))
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Control(_) => "control",
            ClientMessage::Reset => "reset",
            ClientMessage::Pause => "pause",
            ClientMessage::Resume => "resume",
            ClientMessage::Prompt { .. } => "prompt",
            ClientMessage::PromptWithSeed { .. } => "prompt_with_seed",
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Status {
        code: StatusCode,
    },
    /// A compressed frame. `data` is base64 JPEG.
    Frame {
        data: String,
        frame_id: u64,
        client_ts: f64,
        gen_ms: f64,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn status(code: StatusCode) -> Self {
        ServerMessage::Status { code }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}
