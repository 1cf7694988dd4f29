//! Error types for the meshnode library.

use thiserror::Error;

/// Failures at the byte-level connection to a node.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The configured serial port does not exist (or vanished).
    #[error("port not found: {port}")]
    NotFound { port: String },

    /// The serial port is locked by another process.
    #[error("port busy: {port}")]
    Busy { port: String },

    /// The TCP host could not be reached.
    #[error("host unreachable: {host}")]
    Unreachable { host: String },

    /// A connect, read, or write did not complete within its time budget.
    #[error("transport timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Read or write attempted on a closed transport.
    #[error("not connected")]
    NotConnected,

    /// OS-level failure that does not map onto a more specific cause.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures in the request/response exchange with a node.
///
/// These are the only two kinds the poller distinguishes; both mean
/// "this cycle failed, retry on the next tick".
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// No response arrived within the bounded window.
    #[error("no response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The response could not be decoded.
    #[error("malformed response: {reason}")]
    Malformed { reason: String },
}

/// Failures resolving a command against the configured node set.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No target given and more than one node is configured.
    #[error("multiple nodes configured; specify a target node id")]
    AmbiguousTarget,

    /// The given node id is not configured.
    #[error("unknown node: {node_id}")]
    UnknownNode { node_id: String },

    /// The given channel name does not exist on the node.
    #[error("unknown channel: {name}")]
    UnknownChannel { name: String },

    /// A command argument failed validation before any I/O happened.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}

/// The main error type for meshnode operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Protocol-level failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Configuration/target-resolution failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias for meshnode operations.
pub type Result<T> = std::result::Result<T, Error>;
