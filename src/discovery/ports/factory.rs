//! Transport factory port: turns a server specification into a connection.

use super::Connection;
use crate::discovery::domain::{ServerSpec, TransportKind};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Strategy that establishes a [`Connection`] for a server specification.
///
/// A connection is only returned once the transport-level handshake has
/// completed. Factories hold no mutable state shared between calls.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Connects to the server described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] when the link cannot be established.
    async fn connect(&self, spec: &ServerSpec) -> Result<Connection, ConnectionError>;
}

/// Errors returned while establishing a connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The server process could not be started.
    #[error("failed to spawn '{command}': {message}")]
    Spawn {
        /// Command that failed to start.
        command: String,
        /// Operating-system error message.
        message: String,
    },

    /// The server process exited before the handshake completed.
    #[error("process exited before handshake ({status})")]
    ExitedBeforeHandshake {
        /// Exit status as reported by the operating system.
        status: String,
    },

    /// A network-level failure occurred.
    #[error("{0}")]
    Network(String),

    /// The server answered the stream request with a non-success status.
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// The transport opened but the protocol handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The factory does not handle the specification's transport kind.
    #[error("transport '{0}' is not supported by this factory")]
    UnsupportedTransport(TransportKind),

    /// The connect step exceeded its deadline.
    #[error("connection timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}
