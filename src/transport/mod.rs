//! Transport layer for node communication.
//!
//! A transport is one logical connection to a node, speaking whole
//! protocol frames over a serial port or a TCP socket. Transports are
//! deliberately short-lived: the poller and the command dispatcher open
//! one per session and close it before the session ends, on every path.

pub mod serial;
pub mod tcp;

#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::{ConnectionKind, NodeConfig};
use crate::error::TransportError;
use crate::protocol::{FrameDecoder, encode_frame};

/// Default budget for a single frame read or write.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Trait for transport implementations.
///
/// All I/O is bounded by the transport's configured timeout; no call
/// blocks indefinitely. After [`close`](Transport::close), reads and
/// writes fail with [`TransportError::NotConnected`]. `close` is
/// idempotent.
pub trait Transport: Send {
    /// Sends one protocol frame.
    fn send_frame(
        &mut self,
        payload: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>>;

    /// Receives the next protocol frame.
    fn recv_frame(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, TransportError>> + Send + '_>>;

    /// Closes the connection. Safe to call more than once.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>>;

    /// Returns true if the connection is open.
    fn is_open(&self) -> bool;
}

/// Frame-oriented wrapper over any async byte stream.
///
/// Both concrete transports are aliases of this type; they differ only
/// in how [`serial::SerialTransport::open`] and
/// [`tcp::TcpTransport::open`] establish the stream and classify
/// failures.
pub struct FramedStream<S> {
    stream: Option<S>,
    decoder: FrameDecoder,
    io_timeout: Duration,
    label: String,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> FramedStream<S> {
    pub(crate) fn new(stream: S, io_timeout: Duration, label: String) -> Self {
        Self {
            stream: Some(stream),
            decoder: FrameDecoder::new(),
            io_timeout,
            label,
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.io_timeout.as_millis()).unwrap_or(u64::MAX)
    }

    async fn do_send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        if self.stream.is_none() {
            return Err(TransportError::NotConnected);
        }
        let frame = encode_frame(&payload);
        tracing::trace!(transport = %self.label, "sending frame: {} bytes", frame.len());

        let timeout_ms = self.timeout_ms();
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        tokio::time::timeout(self.io_timeout, async {
            stream.write_all(&frame).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| TransportError::Timeout { timeout_ms })?
        .map_err(TransportError::Io)?;

        Ok(())
    }

    async fn do_recv(&mut self) -> Result<Bytes, TransportError> {
        if self.stream.is_none() {
            return Err(TransportError::NotConnected);
        }
        let timeout_ms = self.timeout_ms();
        let io_timeout = self.io_timeout;
        let label = self.label.clone();

        tokio::time::timeout(io_timeout, async {
            loop {
                loop {
                    match self.decoder.decode() {
                        Ok(Some(frame)) => {
                            tracing::trace!(transport = %label, "decoded frame: {} bytes", frame.len());
                            return Ok(frame);
                        }
                        Ok(None) => break, // Need more data
                        Err(e) => {
                            // The decoder skips invalid bytes; keep scanning.
                            tracing::warn!(transport = %label, "frame decode error: {}", e);
                        }
                    }
                }

                let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
                let mut buf = [0u8; 1024];
                let n = stream.read(&mut buf).await.map_err(TransportError::Io)?;
                if n == 0 {
                    return Err(TransportError::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        "connection closed by peer",
                    )));
                }
                tracing::trace!(transport = %label, "received {} bytes", n);
                self.decoder.feed(&buf[..n]);
            }
        })
        .await
        .map_err(|_| TransportError::Timeout { timeout_ms })?
    }

    fn do_close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(transport = %self.label, "closing transport");
        }
        self.decoder.clear();
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Transport for FramedStream<S> {
    fn send_frame(
        &mut self,
        payload: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(self.do_send(payload))
    }

    fn recv_frame(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, TransportError>> + Send + '_>> {
        Box::pin(self.do_recv())
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(async move {
            self.do_close();
            Ok(())
        })
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Transport for Box<dyn Transport> {
    fn send_frame(
        &mut self,
        payload: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        (**self).send_frame(payload)
    }

    fn recv_frame(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, TransportError>> + Send + '_>> {
        (**self).recv_frame()
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Turns a [`NodeConfig`] into a fresh transport.
///
/// The poller and dispatcher acquire a new transport through this seam
/// every cycle rather than holding a long-lived connection; tests
/// substitute a scripted implementation.
pub trait Connector: Send + Sync {
    /// Opens a transport for the node's configured connection kind.
    fn connect<'a>(
        &'a self,
        config: &'a NodeConfig,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Transport>, TransportError>> + Send + 'a>>;
}

/// Production connector: serial or TCP per the node's configuration.
#[derive(Debug, Clone, Default)]
pub struct NetConnector;

impl Connector for NetConnector {
    fn connect<'a>(
        &'a self,
        config: &'a NodeConfig,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Transport>, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            match &config.connection {
                ConnectionKind::Usb { port } => {
                    let transport =
                        serial::SerialTransport::open(serial::SerialConfig::new(port)).await?;
                    Ok(Box::new(transport) as Box<dyn Transport>)
                }
                ConnectionKind::Tcp { host, port } => {
                    let transport =
                        tcp::TcpTransport::open(tcp::TcpConfig::new(host, *port)).await?;
                    Ok(Box::new(transport) as Box<dyn Transport>)
                }
            }
        })
    }
}

pub use serial::SerialTransport;
pub use tcp::TcpTransport;
