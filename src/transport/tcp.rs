//! TCP/Wi-Fi transport implementation.

use std::io;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::error::TransportError;
use crate::transport::{DEFAULT_IO_TIMEOUT, FramedStream};

/// Default budget for establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Configuration for TCP transport.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Budget for establishing the connection.
    pub connect_timeout: Duration,
    /// Budget for a single frame read or write.
    pub io_timeout: Duration,
}

impl TcpConfig {
    /// Creates a new TCP configuration with default settings.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }
}

/// TCP transport for node communication.
pub type TcpTransport = FramedStream<TcpStream>;

impl TcpTransport {
    /// Connects to the node's TCP port within the configured budget.
    ///
    /// Fails with [`TransportError::Timeout`] when the connect budget is
    /// exhausted and [`TransportError::Unreachable`] when the host
    /// refuses or cannot be routed.
    pub async fn open(config: TcpConfig) -> Result<Self, TransportError> {
        let addr = format!("{}:{}", config.host, config.port);
        tracing::info!("connecting to {}", addr);

        let timeout_ms = u64::try_from(config.connect_timeout.as_millis()).unwrap_or(u64::MAX);
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::Timeout { timeout_ms })?
            .map_err(|e| classify_connect_error(&config.host, e))?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("failed to set TCP_NODELAY: {}", e);
        }

        tracing::info!("connected to {}", addr);
        Ok(FramedStream::new(
            stream,
            config.io_timeout,
            format!("tcp:{addr}"),
        ))
    }
}

/// Maps TCP connect failures onto the transport taxonomy.
fn classify_connect_error(host: &str, err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable
        | io::ErrorKind::AddrNotAvailable => TransportError::Unreachable {
            host: host.to_owned(),
        },
        io::ErrorKind::TimedOut => TransportError::Timeout { timeout_ms: 0 },
        _ => TransportError::Io(err),
    }
}
