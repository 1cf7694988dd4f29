//! Request opcodes and encoders.
//!
//! Requests are a single opcode byte followed by opcode-specific
//! arguments. Encoders return the unframed payload; the transport frames
//! it on send.

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::frame::MAX_FRAME_SIZE;

/// Maximum text length in a send-text request: the frame payload limit
/// minus the opcode byte and the 4-byte destination.
pub const MAX_TEXT_LEN: usize = MAX_FRAME_SIZE - 5;

/// Request opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestOpcode {
    /// Query node identity.
    GetNodeInfo = 0x01,
    /// Query channel list.
    GetChannels = 0x02,
    /// Query link and device metrics.
    GetMetrics = 0x03,
    /// Query routing table size.
    GetRouting = 0x04,
    /// Pop the next buffered message, if any.
    GetMessage = 0x05,
    /// Send a text message.
    SendText = 0x10,
    /// Reboot the node.
    Reboot = 0x11,
    /// Set the primary channel by name.
    SetChannel = 0x12,
}

/// Broadcast destination for [`encode_send_text`].
pub const BROADCAST_DEST: u32 = 0;

/// Encodes a node-info query.
#[must_use]
pub fn encode_get_node_info() -> Bytes {
    Bytes::from_static(&[RequestOpcode::GetNodeInfo as u8])
}

/// Encodes a channels query.
#[must_use]
pub fn encode_get_channels() -> Bytes {
    Bytes::from_static(&[RequestOpcode::GetChannels as u8])
}

/// Encodes a metrics query.
#[must_use]
pub fn encode_get_metrics() -> Bytes {
    Bytes::from_static(&[RequestOpcode::GetMetrics as u8])
}

/// Encodes a routing-table query.
#[must_use]
pub fn encode_get_routing() -> Bytes {
    Bytes::from_static(&[RequestOpcode::GetRouting as u8])
}

/// Encodes a next-message query.
#[must_use]
pub fn encode_get_message() -> Bytes {
    Bytes::from_static(&[RequestOpcode::GetMessage as u8])
}

/// Encodes a send-text request.
///
/// `destination` is the target node number; `None` broadcasts.
#[must_use]
pub fn encode_send_text(text: &str, destination: Option<u32>) -> Bytes {
    let mut buf = BytesMut::with_capacity(5 + text.len());
    buf.put_u8(RequestOpcode::SendText as u8);
    buf.put_u32_le(destination.unwrap_or(BROADCAST_DEST));
    buf.put_slice(text.as_bytes());
    buf.freeze()
}

/// Encodes a reboot request.
#[must_use]
pub fn encode_reboot() -> Bytes {
    Bytes::from_static(&[RequestOpcode::Reboot as u8])
}

/// Encodes a set-primary-channel request.
#[must_use]
pub fn encode_set_channel(name: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + name.len());
    buf.put_u8(RequestOpcode::SetChannel as u8);
    buf.put_slice(name.as_bytes());
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_text_broadcast() {
        let data = encode_send_text("hello", None);
        assert_eq!(data[0], RequestOpcode::SendText as u8);
        assert_eq!(&data[1..5], &[0, 0, 0, 0]);
        assert_eq!(&data[5..], b"hello");
    }

    #[test]
    fn test_send_text_directed() {
        let data = encode_send_text("hi", Some(0xa1b2_c3d4));
        assert_eq!(&data[1..5], &0xa1b2_c3d4u32.to_le_bytes());
        assert_eq!(&data[5..], b"hi");
    }

    #[test]
    fn test_set_channel() {
        let data = encode_set_channel("Primary");
        assert_eq!(data[0], RequestOpcode::SetChannel as u8);
        assert_eq!(&data[1..], b"Primary");
    }
}
