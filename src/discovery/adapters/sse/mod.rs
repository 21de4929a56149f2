//! Event-stream transport: the HTTP+SSE flavour of MCP.
//!
//! The client opens a long-lived `GET` on the configured URL. The server
//! announces a message endpoint with an `endpoint` event; requests are then
//! `POST`ed to that endpoint and their responses arrive as `message` events
//! on the open stream.

mod events;

use self::events::{SseEvent, decode_events};
use crate::discovery::{
    adapters::jsonrpc::{self, ClientInfo, Incoming},
    domain::{ServerName, ServerSpec, TransportKind, TransportSpec},
    ports::{
        Connection, ConnectionError, McpSession, SessionError, SessionResult, TransportFactory,
    },
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Url, header};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const ENDPOINT_EVENT: &str = "endpoint";
const MESSAGE_EVENT: &str = "message";
const EVENT_BUFFER: usize = 32;

type EventResult = SessionResult<SseEvent>;

/// Connects to servers over a server-sent event stream.
#[derive(Debug, Clone, Default)]
pub struct SseTransportFactory {
    http: reqwest::Client,
    client: ClientInfo,
}

impl SseTransportFactory {
    /// Creates a factory using the given HTTP client and client identity.
    #[must_use]
    pub const fn new(http: reqwest::Client, client: ClientInfo) -> Self {
        Self { http, client }
    }

    async fn open_stream(
        &self,
        server: &ServerName,
        url: &str,
    ) -> Result<(Url, EventReader), ConnectionError> {
        let stream_url = Url::parse(url)
            .map_err(|err| ConnectionError::Network(format!("invalid url '{url}': {err}")))?;

        let response = self
            .http
            .get(stream_url)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|err| ConnectionError::Network(describe_reqwest_error(&err)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectionError::HttpStatus(status.as_u16()));
        }

        let base = response.url().clone();
        Ok((base, EventReader::spawn(server.clone(), response)))
    }
}

#[async_trait]
impl TransportFactory for SseTransportFactory {
    async fn connect(&self, spec: &ServerSpec) -> Result<Connection, ConnectionError> {
        let TransportSpec::EventStream(stream) = spec.transport() else {
            return Err(ConnectionError::UnsupportedTransport(spec.kind()));
        };

        let (base, mut reader) = self.open_stream(spec.name(), stream.url()).await?;
        let endpoint = reader.wait_for_endpoint(&base).await?;
        tracing::debug!(server = %spec.name(), %endpoint, "event stream announced message endpoint");

        let mut session = SseSession {
            server: spec.name().clone(),
            http: self.http.clone(),
            endpoint,
            reader,
            next_id: 1,
        };
        session
            .initialize(&self.client)
            .await
            .map_err(|err| ConnectionError::Handshake(err.to_string()))?;

        tracing::debug!(server = %spec.name(), "event stream handshake completed");
        Ok(Connection::new(
            spec.name().clone(),
            TransportKind::EventStream,
            Box::new(session),
        ))
    }
}

/// Background task draining the event stream into a channel.
///
/// Dropping the reader aborts the task, which drops the HTTP response and
/// closes the stream.
struct EventReader {
    events: mpsc::Receiver<EventResult>,
    task: JoinHandle<()>,
}

impl EventReader {
    fn spawn(server: ServerName, response: reqwest::Response) -> Self {
        let (sender, events) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(pump_events(server, response, sender));
        Self { events, task }
    }

    async fn wait_for_endpoint(&mut self, base: &Url) -> Result<Url, ConnectionError> {
        loop {
            match self.events.recv().await {
                Some(Ok(event)) if event.event == ENDPOINT_EVENT => {
                    return base.join(event.data.trim()).map_err(|err| {
                        ConnectionError::Handshake(format!("invalid endpoint event: {err}"))
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(ConnectionError::Handshake(err.to_string())),
                None => {
                    return Err(ConnectionError::Handshake(
                        "stream closed before the endpoint event".to_owned(),
                    ));
                }
            }
        }
    }

    async fn next_message(&mut self) -> SessionResult<String> {
        loop {
            match self.events.recv().await {
                Some(Ok(event)) if event.event == MESSAGE_EVENT => return Ok(event.data),
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err),
                None => return Err(SessionError::Closed),
            }
        }
    }

    fn stop(&mut self) {
        self.task.abort();
        self.events.close();
    }
}

impl Drop for EventReader {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn pump_events(
    server: ServerName,
    response: reqwest::Response,
    sender: mpsc::Sender<EventResult>,
) {
    let body = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(|err| describe_reqwest_error(&err)));
    let mut events = std::pin::pin!(decode_events(body));

    while let Some(event) = events.next().await {
        let failed = event.is_err();
        if sender.send(event).await.is_err() {
            tracing::debug!(server = %server, "event stream receiver dropped");
            return;
        }
        if failed {
            return;
        }
    }
    tracing::debug!(server = %server, "event stream ended");
}

/// Initialised session over an event stream.
pub struct SseSession {
    server: ServerName,
    http: reqwest::Client,
    endpoint: Url,
    reader: EventReader,
    next_id: u64,
}

impl SseSession {
    async fn initialize(&mut self, client: &ClientInfo) -> SessionResult<()> {
        let result = self
            .call("initialize", jsonrpc::initialize_params(client))
            .await?;
        jsonrpc::check_initialize_result(&result).map_err(SessionError::Malformed)?;
        self.post(&jsonrpc::notification("notifications/initialized"))
            .await
    }

    async fn call(&mut self, method: &str, params: Value) -> SessionResult<Value> {
        let id = self.next_id;
        self.next_id += 1;
        self.post(&jsonrpc::request(id, method, params)).await?;

        loop {
            let data = self.reader.next_message().await?;
            match jsonrpc::decode(data.as_bytes()) {
                Ok(Incoming::Response {
                    id: response_id,
                    outcome,
                }) if response_id == id => return outcome,
                Ok(Incoming::Request {
                    id: request_id,
                    method,
                }) => {
                    tracing::debug!(server = %self.server, %method, "answering server request");
                    self.post(&jsonrpc::reply_to(request_id, &method)).await?;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(server = %self.server, error = %err, "skipping undecodable event");
                }
            }
        }
    }

    async fn post(&self, message: &Value) -> SessionResult<()> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(message)
            .send()
            .await
            .map_err(|err| SessionError::Io(describe_reqwest_error(&err)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SessionError::Io(format!(
                "message endpoint returned HTTP {}",
                status.as_u16()
            )))
        }
    }
}

#[async_trait]
impl McpSession for SseSession {
    async fn request(&mut self, method: &str, params: Value) -> SessionResult<Value> {
        self.call(method, params).await
    }

    async fn shutdown(&mut self) -> SessionResult<()> {
        self.reader.stop();
        tracing::debug!(server = %self.server, "event stream closed");
        Ok(())
    }

    fn abort(&mut self) {
        self.reader.stop();
    }
}

/// Flattens a reqwest error and its sources into one readable line.
fn describe_reqwest_error(err: &reqwest::Error) -> String {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::ConnectionRefused
        {
            return "connection refused".to_owned();
        }
        source = cause.source();
    }

    if err.is_timeout() {
        return "request timed out".to_owned();
    }
    if err.is_connect() {
        return "connection failed".to_owned();
    }
    err.to_string()
}
