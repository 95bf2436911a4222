//! Text encoding of the wire protocol. Stateless.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use beach_surf_core::{ClientMessage, ServerMessage};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[source] serde_json::Error),
    #[error("expected a json object")]
    NotAnObject,
    #[error("invalid message: {0}")]
    Invalid(#[source] serde_json::Error),
}

impl DecodeError {
    pub fn metric_label(&self) -> &'static str {
        match self {
            DecodeError::Json(_) => "invalid_json",
            DecodeError::NotAnObject => "not_an_object",
            DecodeError::Invalid(_) => "invalid_message",
        }
    }
}

/// Parses one inbound payload. Objects without a `type` are control input.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, DecodeError> {
    let mut value: Value = serde_json::from_str(text).map_err(DecodeError::Json)?;
    let object = value.as_object_mut().ok_or(DecodeError::NotAnObject)?;
    if !object.contains_key("type") {
        object.insert("type".into(), Value::String("control".into()));
    }
    serde_json::from_value(value).map_err(DecodeError::Invalid)
}

pub fn encode_server_message(message: &ServerMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

/// Builds a frame message around already-compressed image bytes.
pub fn frame_message(jpeg: &[u8], frame_id: u64, client_ts: f64, gen_ms: f64) -> ServerMessage {
    ServerMessage::Frame {
        data: STANDARD.encode(jpeg),
        frame_id,
        client_ts,
        gen_ms,
    }
}
