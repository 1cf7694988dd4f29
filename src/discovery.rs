//! Device discovery: USB-serial enumeration and local subnet scanning.
//!
//! USB discovery enumerates serial ports and keeps only adapters whose
//! USB vendor/product ids are known radio hardware; built-in UART
//! devices and virtual machine serial ports are filtered out. Network
//! discovery probes every host on a /24 subnet at the node TCP port and
//! keeps the hosts that answer an identity query.
//!
//! Discovery only suggests candidates. Nothing is connected to until a
//! candidate is turned into a [`NodeConfig`] and added to a dispatcher.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_serial::{SerialPortInfo, SerialPortType};

use crate::client::NodeClient;
use crate::config::{DEFAULT_TCP_PORT, NodeConfig};
use crate::error::TransportError;
use crate::transport::{Connector, NetConnector};
use crate::types::NodeInfo;

/// USB vendor/product id pairs of known radio adapters.
///
/// CP210x and CH340/CH9102 bridges plus the native-USB RAK, Heltec and
/// Seeed boards.
pub const KNOWN_USB_IDS: &[(u16, u16)] = &[
    (0x10C4, 0xEA60), // Silicon Labs CP210x
    (0x1A86, 0x7523), // QinHeng CH340
    (0x1A86, 0x55D4), // QinHeng CH9102
    (0x239A, 0x8029), // RAK4631
    (0x239A, 0x8109), // RAK11200
    (0x2886, 0x0045), // Seeed T1000-E
    (0x2886, 0x0046), // Seeed SenseCAP
];

/// Port path prefixes that are never radio hardware (platform UARTs).
const IGNORED_PORT_PREFIXES: &[&str] = &["/dev/ttyS", "/dev/ttyAMA"];

/// A USB-serial adapter that looks like a radio.
#[derive(Debug, Clone)]
pub struct UsbCandidate {
    /// Serial port path, e.g. "/dev/ttyUSB0".
    pub port: String,
    /// USB vendor id.
    pub vid: u16,
    /// USB product id.
    pub pid: u16,
    /// USB product string, if the adapter reports one.
    pub product: Option<String>,
}

impl UsbCandidate {
    /// Turns the candidate into a node configuration.
    #[must_use]
    pub fn into_config(self) -> NodeConfig {
        NodeConfig::usb(self.port)
    }
}

/// A network host that answered an identity query on the node port.
#[derive(Debug, Clone)]
pub struct TcpCandidate {
    /// Host address.
    pub host: Ipv4Addr,
    /// TCP port the node answered on.
    pub port: u16,
    /// Identity reported by the node during the probe.
    pub node: NodeInfo,
}

impl TcpCandidate {
    /// Turns the candidate into a node configuration.
    #[must_use]
    pub fn into_config(self) -> NodeConfig {
        let config = NodeConfig::tcp(self.host.to_string(), self.port);
        match self.node.node_name {
            Some(name) => config.name(name),
            None => config,
        }
    }
}

/// Enumerates serial ports and returns the plausible radio adapters.
pub async fn scan_usb() -> Result<Vec<UsbCandidate>, TransportError> {
    let ports = tokio::task::spawn_blocking(tokio_serial::available_ports)
        .await
        .map_err(|e| TransportError::Io(std::io::Error::other(e)))?
        .map_err(|e| TransportError::Io(std::io::Error::other(e)))?;

    let candidates = filter_ports(ports);
    tracing::info!("USB scan found {} candidate(s)", candidates.len());
    Ok(candidates)
}

/// Applies the allow-list and exclusion rules to enumerated ports.
fn filter_ports(ports: Vec<SerialPortInfo>) -> Vec<UsbCandidate> {
    ports
        .into_iter()
        .filter_map(|info| {
            if IGNORED_PORT_PREFIXES
                .iter()
                .any(|prefix| info.port_name.starts_with(prefix))
            {
                tracing::trace!("skipping platform UART {}", info.port_name);
                return None;
            }

            let SerialPortType::UsbPort(usb) = info.port_type else {
                return None;
            };
            if !KNOWN_USB_IDS.contains(&(usb.vid, usb.pid)) {
                tracing::trace!(
                    "skipping {} with unknown ids {:04x}:{:04x}",
                    info.port_name,
                    usb.vid,
                    usb.pid
                );
                return None;
            }
            // VM-emulated adapters report real bridge ids but are not
            // radios.
            if usb
                .product
                .as_deref()
                .is_some_and(|p| p.to_ascii_lowercase().contains("virtualbox"))
            {
                tracing::trace!("skipping VM serial port {}", info.port_name);
                return None;
            }

            Some(UsbCandidate {
                port: info.port_name,
                vid: usb.vid,
                pid: usb.pid,
                product: usb.product,
            })
        })
        .collect()
}

/// Tuning knobs for a subnet scan.
#[derive(Debug, Clone)]
pub struct NetworkScanOptions {
    /// Any address on the /24 to scan; defaults to the host's own.
    pub subnet: Option<Ipv4Addr>,
    /// TCP port to probe.
    pub port: u16,
    /// Budget per host probe (connect plus identity query).
    pub probe_timeout: Duration,
    /// Overall scan deadline; hosts found so far are still returned.
    pub deadline: Duration,
    /// How many hosts are probed at once.
    pub concurrency: usize,
}

impl Default for NetworkScanOptions {
    fn default() -> Self {
        Self {
            subnet: None,
            port: DEFAULT_TCP_PORT,
            probe_timeout: Duration::from_millis(500),
            deadline: Duration::from_secs(20),
            concurrency: 32,
        }
    }
}

/// Probes every host on the /24 subnet and returns those that answered
/// an identity query.
///
/// A host only counts when a real node responds; an open port with a
/// different service on it does not. Hitting the deadline returns the
/// partial results found so far.
pub async fn scan_network(options: &NetworkScanOptions) -> Vec<TcpCandidate> {
    scan_with(&NetConnector, options).await
}

async fn scan_with(connector: &dyn Connector, options: &NetworkScanOptions) -> Vec<TcpCandidate> {
    let base = match options.subnet {
        Some(addr) => addr,
        None => local_ipv4(),
    };
    let [a, b, c, _] = base.octets();
    tracing::info!("scanning {a}.{b}.{c}.0/24 on port {}", options.port);

    let deadline = tokio::time::Instant::now() + options.deadline;
    let mut probes = stream::iter((1..=254u8).map(|host| {
        probe_host(
            connector,
            Ipv4Addr::new(a, b, c, host),
            options.port,
            options.probe_timeout,
        )
    }))
    .buffer_unordered(options.concurrency.max(1));

    let mut found = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, probes.next()).await {
            Ok(Some(Some(candidate))) => {
                tracing::info!(
                    "found node {} at {}",
                    candidate.node.node_id(),
                    candidate.host
                );
                found.push(candidate);
            }
            Ok(Some(None)) => {}
            Ok(None) => break,
            Err(_) => {
                tracing::warn!("subnet scan deadline reached, returning partial results");
                break;
            }
        }
    }

    found
}

/// Connects to one host and asks it to identify itself. The whole
/// probe, connect included, is bounded by `probe_timeout`.
async fn probe_host(
    connector: &dyn Connector,
    host: Ipv4Addr,
    port: u16,
    probe_timeout: Duration,
) -> Option<TcpCandidate> {
    let config = NodeConfig::tcp(host.to_string(), port);
    let transport = tokio::time::timeout(probe_timeout, connector.connect(&config))
        .await
        .ok()?
        .ok()?;

    let mut client = NodeClient::new(transport);
    client.set_timeout(probe_timeout);
    let result = client.node_info().await;
    if let Err(e) = client.close().await {
        tracing::debug!("error closing probe transport: {e}");
    }

    match result {
        Ok(node) => Some(TcpCandidate { host, port, node }),
        Err(e) => {
            tracing::trace!("host {host} answered but is not a node: {e}");
            None
        }
    }
}

/// Determines the host's primary IPv4 address without sending traffic:
/// a connected UDP socket picks the outbound interface. Falls back to
/// loopback when the host has no route out.
fn local_ipv4() -> Ipv4Addr {
    let addr = std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip());
    match addr {
        Ok(IpAddr::V4(addr)) => addr,
        Ok(IpAddr::V6(_)) | Err(_) => {
            tracing::warn!("could not determine local IPv4 address, using loopback");
            Ipv4Addr::LOCALHOST
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_serial::UsbPortInfo;

    use crate::transport::mock::{MockConnector, MockOutcome, Script, frames};

    fn usb_port(name: &str, vid: u16, pid: u16, product: Option<&str>) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_owned(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid,
                pid,
                serial_number: None,
                manufacturer: None,
                product: product.map(str::to_owned),
            }),
        }
    }

    #[test]
    fn test_known_adapter_kept() {
        let found = filter_ports(vec![usb_port(
            "/dev/ttyUSB0",
            0x10C4,
            0xEA60,
            Some("CP2102 USB to UART Bridge Controller"),
        )]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].port, "/dev/ttyUSB0");
    }

    #[test]
    fn test_platform_uart_excluded() {
        // Even with matching ids, platform UART paths never qualify.
        let found = filter_ports(vec![
            usb_port("/dev/ttyS0", 0x10C4, 0xEA60, None),
            usb_port("/dev/ttyAMA0", 0x1A86, 0x7523, None),
        ]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_unknown_ids_excluded() {
        let found = filter_ports(vec![usb_port("/dev/ttyUSB1", 0x0403, 0x6001, None)]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_vm_serial_port_excluded() {
        let found = filter_ports(vec![usb_port(
            "/dev/ttyUSB2",
            0x10C4,
            0xEA60,
            Some("VirtualBox Serial Port"),
        )]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_non_usb_port_excluded() {
        let found = filter_ports(vec![SerialPortInfo {
            port_name: "/dev/ttyXR0".to_owned(),
            port_type: SerialPortType::PciPort,
        }]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_mixed_enumeration() {
        let found = filter_ports(vec![
            usb_port("/dev/ttyS0", 0x10C4, 0xEA60, None),
            usb_port("/dev/ttyUSB0", 0x1A86, 0x55D4, Some("CH9102")),
            usb_port("/dev/ttyACM0", 0x239A, 0x8029, None),
            usb_port("/dev/ttyUSB1", 0xDEAD, 0xBEEF, None),
        ]);
        let ports: Vec<&str> = found.iter().map(|c| c.port.as_str()).collect();
        assert_eq!(ports, vec!["/dev/ttyUSB0", "/dev/ttyACM0"]);
    }

    #[test]
    fn test_candidate_to_config() {
        let candidate = UsbCandidate {
            port: "/dev/ttyUSB0".to_owned(),
            vid: 0x10C4,
            pid: 0xEA60,
            product: None,
        };
        assert_eq!(candidate.into_config().node_id(), "serial:/dev/ttyUSB0");
    }

    #[tokio::test]
    async fn test_scan_options_default_port() {
        let options = NetworkScanOptions::default();
        assert_eq!(options.port, DEFAULT_TCP_PORT);
        assert!(options.concurrency > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_keeps_only_identifying_hosts() {
        let connector = MockConnector::new(MockOutcome::Refuse);
        let counter = connector.counter();
        // One real node, and one host with an open port that never
        // answers the identity query.
        connector.push_outcome(MockOutcome::Frames(vec![Script::Reply(frames::node_info(
            0xa1b2_c3d4,
            "2.2.27",
            "HELTEC_V3",
            "Rooftop",
        ))]));
        connector.push_outcome(MockOutcome::Frames(vec![Script::Hang]));

        let options = NetworkScanOptions {
            subnet: Some(Ipv4Addr::new(10, 0, 0, 1)),
            probe_timeout: Duration::from_millis(200),
            ..NetworkScanOptions::default()
        };
        let found = scan_with(&connector, &options).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node.node_id(), "!a1b2c3d4");
        // Both opened probe transports were closed again.
        assert_eq!(counter.opens(), 2);
        assert_eq!(counter.closes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_deadline_returns_partial_results() {
        // Every host but one stalls forever; the deadline must end the
        // scan and still report the node found before it.
        let connector = MockConnector::new(MockOutcome::Stall);
        connector.push_outcome(MockOutcome::Frames(vec![Script::Reply(frames::node_info(
            0x0000_0042,
            "2.3.0",
            "RAK4631",
            "",
        ))]));

        let options = NetworkScanOptions {
            subnet: Some(Ipv4Addr::new(10, 0, 0, 1)),
            probe_timeout: Duration::from_secs(60),
            deadline: Duration::from_secs(1),
            ..NetworkScanOptions::default()
        };
        let found = scan_with(&connector, &options).await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node.node_id(), "!00000042");
    }
}
