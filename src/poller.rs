//! Per-node polling loop.
//!
//! Each configured node runs one [`Poller`]. A cycle acquires a fresh
//! transport, pulls the full query set in a fixed order, and atomically
//! replaces the node's snapshot; any failure replaces it with an
//! unreachable snapshot instead. The transport never outlives the
//! cycle that opened it.
//!
//! Closing and reopening the transport every cycle trades a little
//! latency for self-healing: a wedged serial port or half-open socket
//! costs one failed cycle, after which the next cycle starts clean.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;

use crate::client::NodeClient;
use crate::config::NodeConfig;
use crate::error::{Error, ProtocolError};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::transport::{Connector, Transport};

/// Where a node's poller currently is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PollState {
    /// Waiting for the next tick or a refresh request.
    Idle = 0,
    /// Acquiring a transport.
    Connecting = 1,
    /// Running the query set.
    Querying = 2,
}

impl PollState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Querying,
            _ => Self::Idle,
        }
    }
}

/// Shared handle to one node's poller, held by the dispatcher.
///
/// The connection slot serializes the poller against on-demand
/// commands for the same node; nothing is shared across nodes.
pub(crate) struct NodeHandle {
    pub(crate) config: NodeConfig,
    /// Per-node connection slot. Whoever holds it may open a transport.
    pub(crate) slot: Arc<Mutex<()>>,
    refresh: Arc<Notify>,
    state: Arc<AtomicU8>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl NodeHandle {
    /// Returns the poller's current state.
    pub(crate) fn poll_state(&self) -> PollState {
        PollState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Asks the poller to start a cycle now instead of waiting for the
    /// next tick. A request arriving while a cycle is already in flight
    /// coalesces into that cycle.
    pub(crate) fn request_refresh(&self) {
        if self.poll_state() == PollState::Idle {
            self.refresh.notify_one();
        } else {
            tracing::debug!(node = %self.config.node_id(), "refresh coalesced into in-flight cycle");
        }
    }

    /// Signals shutdown and waits for the poller task to finish. An
    /// in-flight cycle completes first; only the idle wait is
    /// interrupted.
    pub(crate) async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                tracing::warn!("poller task failed: {e}");
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn set_state_for_test(&self, state: PollState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// The polling loop for one node.
pub struct Poller {
    config: NodeConfig,
    connector: Arc<dyn Connector>,
    store: SnapshotStore,
    slot: Arc<Mutex<()>>,
    refresh: Arc<Notify>,
    state: Arc<AtomicU8>,
    shutdown: watch::Receiver<bool>,
}

impl Poller {
    /// Spawns the polling task for a node and returns its handle.
    ///
    /// The first cycle starts immediately; subsequent cycles run every
    /// `poll_interval` or on request.
    pub(crate) fn spawn(
        config: NodeConfig,
        connector: Arc<dyn Connector>,
        store: SnapshotStore,
    ) -> NodeHandle {
        let slot = Arc::new(Mutex::new(()));
        let refresh = Arc::new(Notify::new());
        let state = Arc::new(AtomicU8::new(PollState::Idle as u8));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let poller = Self {
            config: config.clone(),
            connector,
            store,
            slot: Arc::clone(&slot),
            refresh: Arc::clone(&refresh),
            state: Arc::clone(&state),
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(poller.run());

        NodeHandle {
            config,
            slot,
            refresh,
            state,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(mut self) {
        let node_id = self.config.node_id();
        tracing::info!(node = %node_id, "poller started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            self.cycle(&node_id).await;

            tokio::select! {
                () = tokio::time::sleep(self.config.poll_interval) => {}
                () = self.refresh.notified() => {
                    tracing::debug!(node = %node_id, "immediate refresh requested");
                }
                result = self.shutdown.changed() => {
                    if result.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(node = %node_id, "poller stopped");
    }

    /// Runs one poll cycle under the node's connection slot and leaves
    /// the state at `Idle`.
    async fn cycle(&self, node_id: &str) {
        let _slot = self.slot.lock().await;
        self.state
            .store(PollState::Connecting as u8, Ordering::SeqCst);

        match self.poll_once().await {
            Ok(snapshot) => {
                tracing::debug!(node = %node_id, "poll cycle succeeded");
                self.store.put(node_id, snapshot);
            }
            Err(err) => {
                tracing::warn!(node = %node_id, "poll cycle failed: {err}");
                self.store.put(node_id, Snapshot::unreachable(err.to_string()));
            }
        }

        self.state.store(PollState::Idle as u8, Ordering::SeqCst);
    }

    /// Connects, queries, and builds the snapshot. The transport is
    /// closed before this returns, on success and on error alike.
    async fn poll_once(&self) -> Result<Snapshot, Error> {
        let transport = self.connector.connect(&self.config).await?;
        self.state
            .store(PollState::Querying as u8, Ordering::SeqCst);

        let mut client = NodeClient::new(transport);
        let result = Self::query(&mut client).await;
        if let Err(e) = client.close().await {
            tracing::debug!("error closing transport: {e}");
        }

        result.map_err(Error::from)
    }

    /// The fixed query order of one cycle.
    async fn query(
        client: &mut NodeClient<Box<dyn Transport>>,
    ) -> Result<Snapshot, ProtocolError> {
        let node = client.node_info().await?;
        let channels = client.channels().await?;
        let (link, device) = client.metrics().await?;
        let routing_count = client.routing_count().await?;
        let last_message = client.fetch_message().await?;

        Ok(Snapshot::ready(
            node,
            channels,
            link,
            device,
            routing_count,
            last_message,
        ))
    }
}
