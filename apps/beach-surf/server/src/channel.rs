//! Bidirectional message channel between a session and its client.
//!
//! Sessions only see text payloads. The WebSocket adapter below hides framing,
//! ping/pong and close handshakes; tests substitute in-memory channels.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
#[error("channel closed")]
pub struct ChannelClosed;

#[async_trait]
pub trait InboundChannel: Send {
    /// Next text payload from the client, or `None` once the client is gone.
    ///
    /// Must be cancel-safe: the coalescer races it against a short timer and
    /// a cancelled call may not lose a payload.
    async fn recv(&mut self) -> Option<String>;
}

#[async_trait]
pub trait OutboundChannel: Send {
    async fn send(&mut self, text: String) -> Result<(), ChannelClosed>;

    /// Closes the channel from the server side.
    async fn close(&mut self) {}
}

pub struct WsInbound {
    stream: SplitStream<WebSocket>,
}

pub struct WsOutbound {
    sink: SplitSink<WebSocket, Message>,
}

pub fn split_socket(socket: WebSocket) -> (WsInbound, WsOutbound) {
    let (sink, stream) = socket.split();
    (WsInbound { stream }, WsOutbound { sink })
}

#[async_trait]
impl InboundChannel for WsInbound {
    async fn recv(&mut self) -> Option<String> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(text),
                // Some clients send JSON as binary frames.
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => return Some(text),
                    Err(_) => debug!("ignoring non-utf8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    debug!(
                        reason = ?frame.map(|f| f.reason.to_string()),
                        "client closed websocket"
                    );
                    return None;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Err(err) => {
                    warn!(error = %err, "error receiving message");
                    return None;
                }
            }
        }
        None
    }
}

#[async_trait]
impl OutboundChannel for WsOutbound {
    async fn send(&mut self, text: String) -> Result<(), ChannelClosed> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|_| ChannelClosed)
    }

    async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}
