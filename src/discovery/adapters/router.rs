//! Transport factory that dispatches on the specification's transport kind.

use super::{SseTransportFactory, StdioTransportFactory};
use crate::discovery::{
    adapters::jsonrpc::ClientInfo,
    domain::{ServerSpec, TransportKind},
    ports::{Connection, ConnectionError, TransportFactory},
};
use async_trait::async_trait;

/// Routes subprocess specs to the stdio factory and event-stream specs to
/// the SSE factory.
#[derive(Debug, Clone, Default)]
pub struct TransportRouter {
    stdio: StdioTransportFactory,
    sse: SseTransportFactory,
}

impl TransportRouter {
    /// Creates a router whose factories announce `client`.
    #[must_use]
    pub fn new(client: &ClientInfo, http: reqwest::Client) -> Self {
        Self {
            stdio: StdioTransportFactory::new(client.clone()),
            sse: SseTransportFactory::new(http, client.clone()),
        }
    }
}

#[async_trait]
impl TransportFactory for TransportRouter {
    async fn connect(&self, spec: &ServerSpec) -> Result<Connection, ConnectionError> {
        tracing::debug!(server = %spec.name(), transport = %spec.kind(), "connecting");
        match spec.kind() {
            TransportKind::Subprocess => self.stdio.connect(spec).await,
            TransportKind::EventStream => self.sse.connect(spec).await,
        }
    }
}
