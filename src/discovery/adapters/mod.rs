//! Transport adapters for the connection factory port.

pub mod memory;

mod jsonrpc;
mod router;
mod sse;
mod stdio;

pub use jsonrpc::ClientInfo;
pub use router::TransportRouter;
pub use sse::{SseSession, SseTransportFactory};
pub use stdio::{StdioSession, StdioTransportFactory};
