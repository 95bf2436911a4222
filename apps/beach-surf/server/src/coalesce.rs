use std::time::Duration;

use beach_surf_core::ClientMessage;
use metrics::counter;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::channel::InboundChannel;
use crate::protocol::decode_client_message;

pub const DEFAULT_POLL_WINDOW: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
#[error("client disconnected")]
pub struct Disconnected;

/// The single item selected by one drain.
#[derive(Debug, Clone, PartialEq)]
pub struct Actionable {
    pub message: ClientMessage,
    /// Control messages read and discarded in favour of this one.
    pub superseded: usize,
}

/// Collapses a client's queued input into one actionable message per tick.
///
/// Control input is latest-wins; any other message type ends the drain
/// immediately so lifecycle requests are never starved by a control flood.
pub struct ControlCoalescer<I> {
    inbound: I,
    window: Duration,
    superseded_total: u64,
}

impl<I: InboundChannel> ControlCoalescer<I> {
    pub fn new(inbound: I, window: Duration) -> Self {
        Self {
            inbound,
            window,
            superseded_total: 0,
        }
    }

    /// Control messages discarded over this coalescer's lifetime.
    pub fn superseded_total(&self) -> u64 {
        self.superseded_total
    }

    /// Drains everything that arrives within the poll window.
    ///
    /// `Ok(None)` means nothing actionable arrived yet and the caller should
    /// poll again. Malformed payloads are logged and skipped. A closed channel
    /// ends the drain with [`Disconnected`], discarding any pending control.
    pub async fn next_actionable(&mut self) -> Result<Option<Actionable>, Disconnected> {
        let mut latest: Option<ClientMessage> = None;
        let mut superseded = 0usize;

        loop {
            let raw = match timeout(self.window, self.inbound.recv()).await {
                Ok(Some(raw)) => raw,
                Ok(None) => return Err(Disconnected),
                Err(_) => break,
            };

            let message = match decode_client_message(&raw) {
                Ok(message) => message,
                Err(err) => {
                    warn!(error = %err, "dropping malformed client message");
                    counter!("beach_surf_decode_failures_total", 1, "reason" => err.metric_label());
                    continue;
                }
            };

            if !message.is_control() {
                // The pending control is discarded along with the earlier ones.
                let superseded = superseded + usize::from(latest.is_some());
                self.record_superseded(superseded);
                debug!(kind = message.kind(), superseded, "priority message bypasses coalescing");
                return Ok(Some(Actionable {
                    message,
                    superseded,
                }));
            }

            if latest.replace(message).is_some() {
                superseded += 1;
            }
        }

        self.record_superseded(superseded);
        Ok(latest.map(|message| Actionable {
            message,
            superseded,
        }))
    }

    fn record_superseded(&mut self, superseded: usize) {
        if superseded > 0 {
            self.superseded_total += superseded as u64;
            counter!("beach_surf_inputs_superseded_total", superseded as u64);
        }
    }
}
