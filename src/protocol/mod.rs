//! Protocol definitions for the node request/response exchange.
//!
//! This module contains the low-level protocol types:
//! - Stream frame encoding/decoding
//! - Packet type definitions
//! - Request opcodes and encoders
//! - Binary response parsing

pub mod command;
pub mod frame;
pub mod packet;
pub mod parser;

pub use command::{
    MAX_TEXT_LEN, RequestOpcode, encode_get_channels, encode_get_message, encode_get_metrics,
    encode_get_node_info, encode_get_routing, encode_reboot, encode_send_text, encode_set_channel,
};
pub use frame::{FrameDecoder, HEADER_SIZE, MAX_FRAME_SIZE, START1, START2, encode as encode_frame};
pub use packet::PacketType;
pub use parser::{
    parse_channels, parse_metrics, parse_node_info, parse_routing_count, parse_text_message,
};
