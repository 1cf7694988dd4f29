//! Node client: the request/response exchange with one node.
//!
//! A [`NodeClient`] wraps an open [`Transport`] for the duration of one
//! session. Queries run strictly sequentially; unsolicited text-message
//! frames arriving between responses are buffered for the session and
//! folded into [`NodeClient::fetch_message`].
//!
//! Every call fails with one of exactly two kinds:
//! [`ProtocolError::Timeout`] when no response arrives within the
//! bounded window, or [`ProtocolError::Malformed`] for anything else
//! (undecodable response, node-reported error, transport fault
//! mid-session). Callers only need to know "this session is done".

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{ProtocolError, TransportError};
use crate::protocol::{
    MAX_TEXT_LEN, PacketType, encode_get_channels, encode_get_message, encode_get_metrics,
    encode_get_node_info, encode_get_routing, encode_reboot, encode_send_text, encode_set_channel,
    parse_channels, parse_metrics, parse_node_info, parse_routing_count, parse_text_message,
};
use crate::transport::Transport;
use crate::types::{ChannelList, DeviceMetrics, LinkMetrics, NodeInfo, TextMessage};

/// Default budget for one request/response round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on queued messages drained in one fetch. A node that
/// keeps answering with more messages cannot stall the cycle; the rest
/// stays queued for the next one.
const MESSAGE_DRAIN_LIMIT: usize = 32;

/// Client for the request/response protocol over one open transport.
pub struct NodeClient<T> {
    transport: T,
    timeout: Duration,
    /// Unsolicited messages heard during this session.
    pending_messages: VecDeque<TextMessage>,
}

impl<T: Transport> NodeClient<T> {
    /// Creates a client over an open transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
            pending_messages: VecDeque::new(),
        }
    }

    /// Sets the per-request timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Closes the underlying transport.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        self.transport.close().await
    }

    /// Sends a request and waits for a response of an expected type.
    ///
    /// Unsolicited text-message frames are buffered; other unexpected
    /// frame types are skipped with a log line.
    async fn request(
        &mut self,
        data: Bytes,
        expected: &[PacketType],
    ) -> Result<(PacketType, Bytes), ProtocolError> {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);

        self.transport
            .send_frame(data)
            .await
            .map_err(|e| map_transport_error(e, timeout_ms))?;

        tokio::time::timeout(self.timeout, async {
            loop {
                let frame = self
                    .transport
                    .recv_frame()
                    .await
                    .map_err(|e| map_transport_error(e, timeout_ms))?;

                if frame.is_empty() {
                    return Err(ProtocolError::Malformed {
                        reason: "empty frame".into(),
                    });
                }

                let Some(packet_type) = PacketType::from_byte(frame[0]) else {
                    return Err(ProtocolError::Malformed {
                        reason: format!("unknown packet type 0x{:02x}", frame[0]),
                    });
                };
                let payload = frame.slice(1..);

                if expected.contains(&packet_type) {
                    return Ok((packet_type, payload));
                }

                if packet_type == PacketType::TextMessage {
                    match parse_text_message(&payload) {
                        Ok(msg) => {
                            tracing::debug!("buffered message notification from {}", msg.sender);
                            self.pending_messages.push_back(msg);
                        }
                        Err(e) => tracing::warn!("failed to parse message push: {}", e),
                    }
                    continue;
                }

                tracing::debug!("skipping unexpected packet type {:?}", packet_type);
            }
        })
        .await
        .map_err(|_| ProtocolError::Timeout { timeout_ms })?
    }

    /// Sends a request and checks the node's Ok/Error reply.
    async fn request_ok(&mut self, data: Bytes) -> Result<(), ProtocolError> {
        let (packet_type, payload) = self
            .request(data, &[PacketType::Ok, PacketType::Error])
            .await?;
        match packet_type {
            PacketType::Ok => Ok(()),
            _ => Err(node_error(&payload)),
        }
    }

    // ==================== Queries ====================

    /// Queries node identity.
    pub async fn node_info(&mut self) -> Result<NodeInfo, ProtocolError> {
        let (packet_type, payload) = self
            .request(
                encode_get_node_info(),
                &[PacketType::NodeInfo, PacketType::Error],
            )
            .await?;
        match packet_type {
            PacketType::NodeInfo => parse_node_info(&payload),
            _ => Err(node_error(&payload)),
        }
    }

    /// Queries the channel list.
    pub async fn channels(&mut self) -> Result<ChannelList, ProtocolError> {
        let (packet_type, payload) = self
            .request(
                encode_get_channels(),
                &[PacketType::Channels, PacketType::Error],
            )
            .await?;
        match packet_type {
            PacketType::Channels => parse_channels(&payload),
            _ => Err(node_error(&payload)),
        }
    }

    /// Queries link and device metrics.
    pub async fn metrics(&mut self) -> Result<(LinkMetrics, DeviceMetrics), ProtocolError> {
        let (packet_type, payload) = self
            .request(
                encode_get_metrics(),
                &[PacketType::Metrics, PacketType::Error],
            )
            .await?;
        match packet_type {
            PacketType::Metrics => parse_metrics(&payload),
            _ => Err(node_error(&payload)),
        }
    }

    /// Queries the routing table size.
    pub async fn routing_count(&mut self) -> Result<usize, ProtocolError> {
        let (packet_type, payload) = self
            .request(
                encode_get_routing(),
                &[PacketType::Routing, PacketType::Error],
            )
            .await?;
        match packet_type {
            PacketType::Routing => parse_routing_count(&payload),
            _ => Err(node_error(&payload)),
        }
    }

    /// Drains buffered messages (both node-side and session pushes) and
    /// returns the most recent one, if any.
    pub async fn fetch_message(&mut self) -> Result<Option<TextMessage>, ProtocolError> {
        let mut latest: Option<TextMessage> = None;

        let mut remaining = MESSAGE_DRAIN_LIMIT;
        loop {
            if remaining == 0 {
                tracing::warn!("message drain limit reached, leaving the rest queued");
                break;
            }
            remaining -= 1;

            let (packet_type, payload) = self
                .request(
                    encode_get_message(),
                    &[
                        PacketType::TextMessage,
                        PacketType::NoMessage,
                        PacketType::Error,
                    ],
                )
                .await?;
            match packet_type {
                PacketType::TextMessage => {
                    let msg = parse_text_message(&payload)?;
                    keep_latest(&mut latest, msg);
                }
                PacketType::NoMessage => break,
                _ => return Err(node_error(&payload)),
            }
        }

        for msg in self.pending_messages.drain(..) {
            keep_latest(&mut latest, msg);
        }

        Ok(latest)
    }

    // ==================== Control operations ====================

    /// Sends a text message. `destination` is a node number; `None`
    /// broadcasts on the primary channel.
    ///
    /// Text longer than [`MAX_TEXT_LEN`] bytes does not fit in one
    /// frame and is rejected before anything is sent.
    pub async fn send_text(
        &mut self,
        text: &str,
        destination: Option<u32>,
    ) -> Result<(), ProtocolError> {
        if text.len() > MAX_TEXT_LEN {
            return Err(ProtocolError::Malformed {
                reason: format!(
                    "message text is {} bytes, limit is {MAX_TEXT_LEN}",
                    text.len()
                ),
            });
        }
        self.request_ok(encode_send_text(text, destination)).await
    }

    /// Reboots the node. The node acknowledges before resetting.
    pub async fn reboot(&mut self) -> Result<(), ProtocolError> {
        self.request_ok(encode_reboot()).await
    }

    /// Sets the primary channel by name.
    pub async fn set_primary_channel(&mut self, name: &str) -> Result<(), ProtocolError> {
        self.request_ok(encode_set_channel(name)).await
    }
}

/// Keeps the message with the later receive time.
fn keep_latest(latest: &mut Option<TextMessage>, candidate: TextMessage) {
    let newer = latest
        .as_ref()
        .is_none_or(|current| candidate.rx_time >= current.rx_time);
    if newer {
        *latest = Some(candidate);
    }
}

/// Converts a node-reported error payload.
fn node_error(payload: &[u8]) -> ProtocolError {
    ProtocolError::Malformed {
        reason: format!(
            "node reported error: {}",
            String::from_utf8_lossy(payload)
        ),
    }
}

/// Folds transport faults into the two protocol failure kinds.
fn map_transport_error(err: TransportError, timeout_ms: u64) -> ProtocolError {
    match err {
        TransportError::Timeout { .. } => ProtocolError::Timeout { timeout_ms },
        other => ProtocolError::Malformed {
            reason: format!("transport: {other}"),
        },
    }
}
