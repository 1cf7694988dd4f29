//! Per-node snapshots and the process-wide snapshot store.
//!
//! A [`Snapshot`] is the latest fully-consistent known state for one
//! node. It is only ever built whole: either every telemetry field came
//! from the same successful poll cycle, or the node is marked
//! unreachable and every telemetry field is absent. Mixes of old and
//! new data within one snapshot cannot be constructed.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use crate::types::{ChannelList, DeviceMetrics, LinkMetrics, NodeInfo, TextMessage};

/// Error cause recorded before the first poll cycle completes.
pub const NEVER_POLLED: &str = "not polled yet";

/// Latest known state for one node.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Whether the last poll cycle succeeded.
    pub reachable: bool,
    /// Human-readable cause of the last failure, if unreachable.
    pub last_error: Option<String>,
    /// Node identity.
    pub node: Option<NodeInfo>,
    /// Channel list; the first entry is the active channel.
    pub channels: ChannelList,
    /// Link quality metrics.
    pub link: Option<LinkMetrics>,
    /// Device health metrics.
    pub device: Option<DeviceMetrics>,
    /// Routing table size.
    pub routing_count: Option<usize>,
    /// Most recent message heard by the node.
    pub last_message: Option<TextMessage>,
    /// When this snapshot was taken.
    pub updated_at: SystemTime,
}

impl Snapshot {
    /// Builds a fully-populated snapshot from one successful poll cycle.
    #[must_use]
    pub fn ready(
        node: NodeInfo,
        channels: ChannelList,
        link: LinkMetrics,
        device: DeviceMetrics,
        routing_count: usize,
        last_message: Option<TextMessage>,
    ) -> Self {
        Self {
            reachable: true,
            last_error: None,
            node: Some(node),
            channels,
            link: Some(link),
            device: Some(device),
            routing_count: Some(routing_count),
            last_message,
            updated_at: SystemTime::now(),
        }
    }

    /// Builds an unreachable snapshot with all telemetry cleared.
    #[must_use]
    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            reachable: false,
            last_error: Some(error.into()),
            node: None,
            channels: ChannelList::default(),
            link: None,
            device: None,
            routing_count: None,
            last_message: None,
            updated_at: SystemTime::now(),
        }
    }

    /// The placeholder stored before the first poll cycle completes.
    #[must_use]
    pub fn never_polled() -> Self {
        Self::unreachable(NEVER_POLLED)
    }

    /// Returns the active (primary) channel name.
    #[must_use]
    pub fn active_channel(&self) -> Option<&str> {
        self.channels.active()
    }
}

/// Process-wide table of per-node snapshots.
///
/// Many readers, one writer per key (that node's poller). Readers get
/// an `Arc` to an immutable snapshot; `put` swaps the whole entry, so a
/// half-written snapshot is never observable.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    inner: Arc<RwLock<HashMap<String, Arc<Snapshot>>>>,
}

impl SnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last snapshot for the node, or the never-polled
    /// placeholder if the node has no entry yet.
    #[must_use]
    pub fn get(&self, node_id: &str) -> Arc<Snapshot> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(Snapshot::never_polled()))
    }

    /// Atomically replaces the node's snapshot.
    pub fn put(&self, node_id: &str, snapshot: Snapshot) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_id.to_owned(), Arc::new(snapshot));
    }

    /// Removes the node's entry (node removed from configuration).
    pub fn remove(&self, node_id: &str) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(node_id);
    }
}
