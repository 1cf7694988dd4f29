//! Packet type definitions.
//!
//! Packet types are the first byte of a received frame payload and
//! indicate what kind of data follows.

/// Response and push notification packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    /// Command executed successfully.
    Ok = 0x00,
    /// Command failed with error (payload is a UTF-8 message).
    Error = 0x01,
    /// Node identity.
    NodeInfo = 0x02,
    /// Channel list.
    Channels = 0x03,
    /// Combined link and device metrics.
    Metrics = 0x04,
    /// Routing table size.
    Routing = 0x05,
    /// Text message. Sent both as a query response and as an unsolicited
    /// push when a message arrives mid-session.
    TextMessage = 0x06,
    /// No buffered message available.
    NoMessage = 0x07,
}

impl PacketType {
    /// Attempts to parse a packet type from a byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Ok),
            0x01 => Some(Self::Error),
            0x02 => Some(Self::NodeInfo),
            0x03 => Some(Self::Channels),
            0x04 => Some(Self::Metrics),
            0x05 => Some(Self::Routing),
            0x06 => Some(Self::TextMessage),
            0x07 => Some(Self::NoMessage),
            _ => None,
        }
    }
}
