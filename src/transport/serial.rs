//! Serial/USB transport implementation.

use std::io;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

use crate::error::TransportError;
use crate::transport::{DEFAULT_IO_TIMEOUT, FramedStream};

/// Default baud rate for Meshtastic serial links.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default delay after opening before the first request.
pub const DEFAULT_CONNECTION_DELAY: Duration = Duration::from_millis(300);

/// Configuration for serial transport.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Delay after opening before sending requests.
    pub connection_delay: Duration,
    /// Budget for a single frame read or write.
    pub io_timeout: Duration,
}

impl SerialConfig {
    /// Creates a new serial configuration with default settings.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            connection_delay: DEFAULT_CONNECTION_DELAY,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the connection delay.
    #[must_use]
    pub const fn connection_delay(mut self, delay: Duration) -> Self {
        self.connection_delay = delay;
        self
    }

    /// Sets the I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }
}

/// Serial transport for node communication.
pub type SerialTransport = FramedStream<SerialStream>;

impl SerialTransport {
    /// Opens the serial port and prepares it for the first request.
    ///
    /// Fails with [`TransportError::NotFound`] if the port path does not
    /// exist and [`TransportError::Busy`] if another process holds it.
    pub async fn open(config: SerialConfig) -> Result<Self, TransportError> {
        tracing::info!("connecting to serial port: {}", config.port);

        let mut stream = tokio_serial::new(&config.port, config.baud_rate)
            .open_native_async()
            .map_err(|e| classify_open_error(&config.port, e))?;

        // Deassert RTS; some boards hold reset while it is high.
        if let Err(e) = stream.write_request_to_send(false) {
            tracing::warn!("failed to set RTS: {}", e);
        }

        // Wait for the device to be ready.
        tokio::time::sleep(config.connection_delay).await;

        drain_stale_data(&mut stream).await;

        tracing::info!("connected to serial port");
        Ok(FramedStream::new(
            stream,
            config.io_timeout,
            format!("serial:{}", config.port),
        ))
    }
}

/// Drains stale data the device buffered before we opened the port.
///
/// Some devices emit boot output shortly after the port opens; reading
/// it off here keeps it out of the first response.
async fn drain_stale_data(stream: &mut SerialStream) {
    let mut buf = [0u8; 1024];
    let mut total_drained = 0usize;

    let drain_deadline = tokio::time::Instant::now() + Duration::from_millis(500);
    while tokio::time::Instant::now() < drain_deadline {
        match tokio::time::timeout(Duration::from_millis(20), stream.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => {
                total_drained += n;
            }
            _ => {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }

    if total_drained > 0 {
        tracing::debug!("drained {} stale bytes from buffer", total_drained);
    }
}

/// Maps serial open failures onto the transport taxonomy.
fn classify_open_error(port: &str, err: tokio_serial::Error) -> TransportError {
    match err.kind() {
        tokio_serial::ErrorKind::NoDevice => TransportError::NotFound {
            port: port.to_owned(),
        },
        tokio_serial::ErrorKind::Io(kind) => match kind {
            io::ErrorKind::NotFound => TransportError::NotFound {
                port: port.to_owned(),
            },
            io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock => TransportError::Busy {
                port: port.to_owned(),
            },
            _ => TransportError::Io(io::Error::new(kind, err.to_string())),
        },
        _ => TransportError::Io(io::Error::other(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_defaults() {
        let config = SerialConfig::new("/dev/ttyUSB0");
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.io_timeout, DEFAULT_IO_TIMEOUT);
    }

    #[test]
    fn test_serial_config_builder() {
        let config = SerialConfig::new("/dev/ttyUSB0")
            .baud_rate(9600)
            .connection_delay(Duration::from_secs(1))
            .io_timeout(Duration::from_secs(2));
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.connection_delay, Duration::from_secs(1));
        assert_eq!(config.io_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_classify_not_found() {
        let err = tokio_serial::Error::new(tokio_serial::ErrorKind::NoDevice, "gone");
        assert!(matches!(
            classify_open_error("/dev/ttyUSB0", err),
            TransportError::NotFound { .. }
        ));
    }

    #[test]
    fn test_classify_busy() {
        let err = tokio_serial::Error::new(
            tokio_serial::ErrorKind::Io(io::ErrorKind::PermissionDenied),
            "locked",
        );
        assert!(matches!(
            classify_open_error("/dev/ttyUSB0", err),
            TransportError::Busy { .. }
        ));
    }
}
