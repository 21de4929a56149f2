//! Port contracts for server connections.

mod factory;
mod session;

#[cfg(test)]
pub use session::MockMcpSession;

pub use factory::{ConnectionError, TransportFactory};
pub use session::{
    Connection, ConnectionState, McpSession, SessionError, SessionResult, TeardownError,
};
