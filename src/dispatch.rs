//! Command dispatcher: node lifecycle and on-demand operations.
//!
//! The [`Dispatcher`] owns the set of managed nodes. It spawns one
//! poller per node and routes commands (send, reboot, set channel,
//! refresh) to the right node. Commands share each node's connection
//! slot with its poller, so a command never races a poll cycle for the
//! same transport; operations against different nodes proceed
//! independently.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::OwnedMutexGuard;

use crate::client::NodeClient;
use crate::config::NodeConfig;
use crate::error::{ConfigError, Error, ProtocolError, Result};
use crate::poller::{NodeHandle, Poller};
use crate::protocol::MAX_TEXT_LEN;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::transport::{Connector, NetConnector, Transport};

/// Entry point for managing nodes and issuing commands.
pub struct Dispatcher {
    connector: Arc<dyn Connector>,
    store: SnapshotStore,
    nodes: RwLock<HashMap<String, NodeHandle>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates a dispatcher using real serial/TCP connections.
    #[must_use]
    pub fn new() -> Self {
        Self::with_connector(Arc::new(NetConnector))
    }

    pub(crate) fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            store: SnapshotStore::new(),
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a node and starts polling it. Returns the node id.
    ///
    /// The snapshot store immediately answers for the node with a
    /// never-polled placeholder; the first cycle starts right away.
    pub fn add_node(&self, config: NodeConfig) -> Result<String> {
        let node_id = config.node_id();

        let mut nodes = self.write_nodes();
        if nodes.contains_key(&node_id) {
            return Err(ConfigError::InvalidInput {
                reason: format!("node already configured: {node_id}"),
            }
            .into());
        }

        tracing::info!(node = %node_id, name = %config.display_name(), "adding node");
        self.store.put(&node_id, Snapshot::never_polled());
        let handle = Poller::spawn(config, Arc::clone(&self.connector), self.store.clone());
        nodes.insert(node_id.clone(), handle);

        Ok(node_id)
    }

    /// Stops polling a node and drops its snapshot.
    pub async fn remove_node(&self, node_id: &str) -> Result<()> {
        let handle = self
            .write_nodes()
            .remove(node_id)
            .ok_or_else(|| ConfigError::UnknownNode {
                node_id: node_id.to_owned(),
            })?;

        tracing::info!(node = %node_id, "removing node");
        handle.shutdown().await;
        self.store.remove(node_id);
        Ok(())
    }

    /// Stops every poller. In-flight cycles complete first.
    pub async fn shutdown(&self) {
        let handles: Vec<NodeHandle> = self.write_nodes().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.shutdown().await;
        }
    }

    /// Ids of all managed nodes.
    #[must_use]
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_nodes().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the latest snapshot for the target node.
    pub fn snapshot(&self, target: Option<&str>) -> Result<Arc<Snapshot>> {
        let nodes = self.read_nodes();
        let handle = pick_node(&nodes, target)?;
        Ok(self.store.get(&handle.config.node_id()))
    }

    /// Requests an immediate poll cycle for the target node. A request
    /// made while a cycle is already running coalesces into it.
    pub fn refresh_now(&self, target: Option<&str>) -> Result<()> {
        let nodes = self.read_nodes();
        let handle = pick_node(&nodes, target)?;
        handle.request_refresh();
        Ok(())
    }

    /// Sends a text message through the target node.
    ///
    /// `destination` is a node id in `!hex` form; `None` broadcasts on
    /// the primary channel.
    pub async fn send_text(
        &self,
        target: Option<&str>,
        text: &str,
        destination: Option<&str>,
    ) -> Result<()> {
        if text.trim().is_empty() {
            return Err(ConfigError::InvalidInput {
                reason: "message text cannot be empty".into(),
            }
            .into());
        }
        if text.len() > MAX_TEXT_LEN {
            return Err(ConfigError::InvalidInput {
                reason: format!(
                    "message text is {} bytes, limit is {MAX_TEXT_LEN}",
                    text.len()
                ),
            }
            .into());
        }
        let dest = destination.map(parse_destination).transpose()?;

        let mut session = self.open_session(target).await?;
        let result = session.client.send_text(text, dest).await;
        session.finish(result).await?;
        tracing::info!(node = %session.node_id, "sent text message");
        Ok(())
    }

    /// Reboots the target node. The node acknowledges before resetting;
    /// the next poll cycles will fail until it is back up.
    pub async fn reboot(&self, target: Option<&str>) -> Result<()> {
        let mut session = self.open_session(target).await?;
        let result = session.client.reboot().await;
        session.finish(result).await?;
        tracing::info!(node = %session.node_id, "reboot requested");
        Ok(())
    }

    /// Makes the named channel the node's primary channel.
    ///
    /// The name is validated against the channel list from the node's
    /// last snapshot before any connection is opened.
    pub async fn set_primary_channel(&self, target: Option<&str>, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidInput {
                reason: "channel name cannot be empty".into(),
            }
            .into());
        }

        let node_id = {
            let nodes = self.read_nodes();
            pick_node(&nodes, target)?.config.node_id()
        };
        if !self.store.get(&node_id).channels.contains(name) {
            return Err(ConfigError::UnknownChannel {
                name: name.to_owned(),
            }
            .into());
        }

        let mut session = self.open_session(Some(&node_id)).await?;
        let result = session.client.set_primary_channel(name).await;
        session.finish(result).await?;
        drop(session);

        // The snapshot's channel order is now stale; repoll promptly.
        tracing::info!(node = %node_id, channel = %name, "primary channel changed");
        let _ = self.refresh_now(Some(&node_id));
        Ok(())
    }

    /// Resolves the target, takes the node's connection slot, and opens
    /// a fresh transport for one command.
    async fn open_session(&self, target: Option<&str>) -> Result<CommandSession> {
        let (node_id, config, slot) = {
            let nodes = self.read_nodes();
            let handle = pick_node(&nodes, target)?;
            (
                handle.config.node_id(),
                handle.config.clone(),
                Arc::clone(&handle.slot),
            )
        };

        let guard = slot.lock_owned().await;
        let transport = self.connector.connect(&config).await?;
        Ok(CommandSession {
            node_id,
            _slot: guard,
            client: NodeClient::new(transport),
        })
    }

    fn read_nodes(&self) -> RwLockReadGuard<'_, HashMap<String, NodeHandle>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_nodes(&self) -> RwLockWriteGuard<'_, HashMap<String, NodeHandle>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One command's exclusive access to a node: the connection slot guard
/// plus an open client. The slot is released when the session drops,
/// after [`CommandSession::finish`] has closed the transport.
struct CommandSession {
    node_id: String,
    _slot: OwnedMutexGuard<()>,
    client: NodeClient<Box<dyn Transport>>,
}

impl CommandSession {
    /// Closes the transport and surfaces the operation's result.
    async fn finish<T>(&mut self, result: std::result::Result<T, ProtocolError>) -> Result<T> {
        if let Err(e) = self.client.close().await {
            tracing::debug!(node = %self.node_id, "error closing transport: {e}");
        }
        result.map_err(Error::from)
    }
}

/// Picks the node a command applies to.
///
/// An explicit target must name a managed node. With no target, a
/// single managed node is used; zero or several are errors.
fn pick_node<'a>(
    nodes: &'a HashMap<String, NodeHandle>,
    target: Option<&str>,
) -> std::result::Result<&'a NodeHandle, ConfigError> {
    match target {
        Some(node_id) => nodes.get(node_id).ok_or_else(|| ConfigError::UnknownNode {
            node_id: node_id.to_owned(),
        }),
        None => {
            let mut iter = nodes.values();
            let first = iter.next().ok_or_else(|| ConfigError::InvalidInput {
                reason: "no nodes configured".into(),
            })?;
            if iter.next().is_some() {
                return Err(ConfigError::AmbiguousTarget);
            }
            Ok(first)
        }
    }
}

/// Parses a `!hex` node id into a node number.
fn parse_destination(id: &str) -> std::result::Result<u32, ConfigError> {
    id.strip_prefix('!')
        .and_then(|hex| u32::from_str_radix(hex, 16).ok())
        .ok_or_else(|| ConfigError::InvalidInput {
            reason: format!("invalid destination node id: {id}"),
        })
}
