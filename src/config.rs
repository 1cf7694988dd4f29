//! Node configuration.
//!
//! A [`NodeConfig`] describes how to reach one mesh-radio node. It is
//! immutable after creation; changing a node's address means removing it
//! and adding a new entry.

use std::time::Duration;

/// Default TCP port a Meshtastic node listens on.
pub const DEFAULT_TCP_PORT: u16 = 4403;

/// Default interval between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// How the node is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionKind {
    /// USB-serial adapter at the given port path (e.g. "/dev/ttyUSB0").
    Usb { port: String },
    /// TCP/Wi-Fi link to the given host and port.
    Tcp { host: String, port: u16 },
}

/// Configuration for one node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Transport kind and address.
    pub connection: ConnectionKind,
    /// Optional friendly name, shown instead of the derived identifier.
    pub name: Option<String>,
    /// Interval between poll cycles.
    pub poll_interval: Duration,
}

impl NodeConfig {
    /// Creates a config for a USB-serial node.
    #[must_use]
    pub fn usb(port: impl Into<String>) -> Self {
        Self {
            connection: ConnectionKind::Usb { port: port.into() },
            name: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Creates a config for a TCP node.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            connection: ConnectionKind::Tcp {
                host: host.into(),
                port,
            },
            name: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the friendly name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns a stable identifier derived from the connection address.
    #[must_use]
    pub fn node_id(&self) -> String {
        match &self.connection {
            ConnectionKind::Usb { port } => format!("serial:{port}"),
            ConnectionKind::Tcp { host, port } => format!("tcp:{host}:{port}"),
        }
    }

    /// Returns a human readable name for the node.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match &self.connection {
            ConnectionKind::Usb { port } => format!("Serial {port}"),
            ConnectionKind::Tcp { host, port } => format!("TCP {host}:{port}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_stable() {
        let usb = NodeConfig::usb("/dev/ttyUSB0");
        assert_eq!(usb.node_id(), "serial:/dev/ttyUSB0");

        let tcp = NodeConfig::tcp("192.168.1.50", DEFAULT_TCP_PORT);
        assert_eq!(tcp.node_id(), "tcp:192.168.1.50:4403");
    }

    #[test]
    fn test_display_name_prefers_friendly_name() {
        let config = NodeConfig::tcp("192.168.1.50", 4403).name("Rooftop");
        assert_eq!(config.display_name(), "Rooftop");

        let unnamed = NodeConfig::usb("/dev/ttyACM0");
        assert_eq!(unnamed.display_name(), "Serial /dev/ttyACM0");
    }
}
