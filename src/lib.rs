//! # meshnode
//!
//! A Rust library for connecting to and polling Meshtastic-style mesh
//! radio nodes.
//!
//! Nodes are reached over USB-serial or TCP/Wi-Fi. Each managed node is
//! polled on a fixed interval for identity, channels, metrics, routing
//! table size and messages; the results land in a snapshot store that
//! any number of readers can consult without touching the radio.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - USB and subnet discovery of candidate devices
//! - Per-node polling with atomic whole-snapshot updates
//! - Commands (send text, reboot, change channel) that never race the
//!   poller for the same node
//! - Comprehensive error handling
//!
//! ## Quick Start
//!
//! ```no_run
//! use meshnode::{Dispatcher, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), meshnode::Error> {
//!     let dispatcher = Dispatcher::new();
//!
//!     // Manage a node over Wi-Fi; polling starts immediately.
//!     dispatcher.add_node(NodeConfig::tcp("192.168.1.50", 4403))?;
//!
//!     // Read the latest snapshot (never blocks on the radio).
//!     let snapshot = dispatcher.snapshot(None)?;
//!     if let Some(node) = &snapshot.node {
//!         println!("node {} firmware {}", node.node_id(), node.firmware);
//!     }
//!
//!     // Send a broadcast on the primary channel.
//!     dispatcher.send_text(None, "hello mesh", None).await?;
//!
//!     dispatcher.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`discovery`] - USB enumeration and subnet scanning for candidates
//! - [`config`] - Per-node connection configuration
//! - [`transport`] - Framed serial and TCP transports
//! - [`protocol`] - Low-level wire protocol (frames, requests, parsing)
//! - [`client`] - Request/response client for one open session
//! - [`poller`] - Per-node polling state machine
//! - [`snapshot`] - Snapshots and the many-reader snapshot store
//! - [`dispatch`] - The [`Dispatcher`]: node lifecycle and commands

pub mod client;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod poller;
pub mod protocol;
pub mod snapshot;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::NodeClient;
pub use config::{ConnectionKind, DEFAULT_POLL_INTERVAL, DEFAULT_TCP_PORT, NodeConfig};
pub use discovery::{NetworkScanOptions, TcpCandidate, UsbCandidate, scan_network, scan_usb};
pub use dispatch::Dispatcher;
pub use error::{ConfigError, Error, ProtocolError, Result, TransportError};
pub use poller::PollState;
pub use snapshot::{Snapshot, SnapshotStore};
pub use transport::{SerialTransport, TcpTransport, Transport};
pub use types::{
    BleInfo, ChannelList, DeviceMetrics, LinkMetrics, MessageType, NodeInfo, TextMessage,
};
