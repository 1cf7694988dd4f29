//! Received message types.

/// Application port a message was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum MessageType {
    /// Plain text message.
    #[default]
    Text = 1,
    /// Position report.
    Position = 3,
    /// Telemetry broadcast.
    Telemetry = 67,
    /// Anything else.
    Other = 0,
}

impl MessageType {
    /// Parses a message type from a port byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Self::Text,
            3 => Self::Position,
            67 => Self::Telemetry,
            _ => Self::Other,
        }
    }

    /// Returns a short label for display.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Position => "position",
            Self::Telemetry => "telemetry",
            Self::Other => "other",
        }
    }
}

/// The most recent message heard by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    /// Message text (may be empty for non-text ports).
    pub text: String,
    /// Sender node id ("!" hex form).
    pub sender: String,
    /// Gateway node id that relayed the message, if different from the
    /// sender.
    pub gateway: Option<String>,
    /// Port the message arrived on.
    pub message_type: MessageType,
    /// Receive timestamp (Unix seconds, node clock).
    pub rx_time: u32,
}
