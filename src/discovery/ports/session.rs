//! Session port and the owned connection handle built on top of it.

use crate::discovery::domain::{ServerName, TransportKind};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Request/response channel to one initialised server.
///
/// Implementations own the underlying transport resources (a child process
/// and its pipes, or an open event stream) and must release them from
/// [`McpSession::abort`] without awaiting.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait McpSession: Send {
    /// Sends one JSON-RPC request and waits for the matching response.
    async fn request(&mut self, method: &str, params: Value) -> SessionResult<Value>;

    /// Closes the session in an orderly way.
    async fn shutdown(&mut self) -> SessionResult<()>;

    /// Releases transport resources immediately, without waiting.
    fn abort(&mut self);
}

/// Errors returned by session implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The peer closed the transport or the session was already closed.
    #[error("transport closed")]
    Closed,

    /// The server answered with a JSON-RPC error object.
    #[error("server error {code}: {message}")]
    Remote {
        /// JSON-RPC error code.
        code: i64,
        /// Error message reported by the server.
        message: String,
    },

    /// A message could not be decoded or had the wrong shape.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Reading from or writing to the transport failed.
    #[error("transport I/O failed: {0}")]
    Io(String),
}

/// Error returned when a connection does not close cleanly.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to close connection to {server}: {source}")]
pub struct TeardownError {
    /// Server whose connection failed to close.
    pub server: ServerName,
    /// Underlying session failure.
    pub source: SessionError,
}

/// Open/closed state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// The transport is live.
    Open,
    /// The connection has been closed.
    Closed,
}

/// Live, exclusively owned link to one server.
///
/// A connection is closed at most once: [`Connection::close`] consumes it.
/// A connection dropped while still open aborts its session, so no exit
/// path leaks a child process or an open stream.
pub struct Connection {
    server_name: ServerName,
    kind: TransportKind,
    session: Box<dyn McpSession>,
    state: ConnectionState,
}

impl Connection {
    /// Wraps an initialised session.
    #[must_use]
    pub fn new(server_name: ServerName, kind: TransportKind, session: Box<dyn McpSession>) -> Self {
        Self {
            server_name,
            kind,
            session,
            state: ConnectionState::Open,
        }
    }

    /// Returns the owning server's name.
    #[must_use]
    pub const fn server_name(&self) -> &ServerName {
        &self.server_name
    }

    /// Returns the transport kind.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Sends one request over the connection.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the transport fails or the server
    /// answers with an error.
    pub async fn request(&mut self, method: &str, params: Value) -> SessionResult<Value> {
        if self.state == ConnectionState::Closed {
            return Err(SessionError::Closed);
        }
        self.session.request(method, params).await
    }

    /// Closes the connection and releases its transport.
    ///
    /// # Errors
    ///
    /// Returns [`TeardownError`] when the session does not shut down
    /// cleanly. The transport is released either way.
    pub async fn close(mut self) -> Result<(), TeardownError> {
        let result = self.session.shutdown().await;
        self.state = ConnectionState::Closed;
        result.map_err(|source| TeardownError {
            server: self.server_name.clone(),
            source,
        })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Connection")
            .field("server_name", &self.server_name)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.state == ConnectionState::Open {
            tracing::debug!(
                server = %self.server_name,
                transport = %self.kind,
                "releasing connection that was not closed"
            );
            self.session.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connection(session: MockMcpSession) -> Connection {
        Connection::new(
            ServerName::new("git").expect("valid name"),
            TransportKind::Subprocess,
            Box::new(session),
        )
    }

    #[tokio::test]
    async fn close_shuts_down_once_and_skips_abort() {
        let mut session = MockMcpSession::new();
        session.expect_shutdown().times(1).returning(|| Ok(()));
        session.expect_abort().times(0);

        connection(session)
            .close()
            .await
            .expect("close should succeed");
    }

    #[tokio::test]
    async fn failed_shutdown_is_reported_without_abort() {
        let mut session = MockMcpSession::new();
        session
            .expect_shutdown()
            .times(1)
            .returning(|| Err(SessionError::Io("broken pipe".to_owned())));
        session.expect_abort().times(0);

        let error = connection(session)
            .close()
            .await
            .expect_err("close should fail");

        assert_eq!(error.server.as_str(), "git");
        assert_eq!(error.source, SessionError::Io("broken pipe".to_owned()));
    }

    #[test]
    fn dropping_an_open_connection_aborts_the_session() {
        let mut session = MockMcpSession::new();
        session.expect_abort().times(1).return_const(());
        session.expect_shutdown().times(0);

        drop(connection(session));
    }

    #[tokio::test]
    async fn request_is_forwarded_to_the_session() {
        let mut session = MockMcpSession::new();
        session
            .expect_request()
            .times(1)
            .returning(|method, _| {
                assert_eq!(method, "tools/list");
                Ok(json!({"tools": []}))
            });
        session.expect_abort().return_const(());

        let mut conn = connection(session);
        let response = conn
            .request("tools/list", json!({}))
            .await
            .expect("request should succeed");

        assert_eq!(response, json!({"tools": []}));
    }
}
