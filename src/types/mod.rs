//! Data types for node state.
//!
//! This module contains the structures a poll cycle assembles into a
//! snapshot:
//! - Node identity
//! - Link and device metrics
//! - Received text messages

pub mod message;
pub mod metrics;
pub mod node;

pub use message::{MessageType, TextMessage};
pub use metrics::{DeviceMetrics, LinkMetrics};
pub use node::{BleInfo, ChannelList, NodeInfo};
