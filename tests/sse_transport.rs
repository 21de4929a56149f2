//! Integration tests for the event-stream transport against an in-process
//! axum server.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
};
use futures::channel::mpsc::{self, UnboundedSender};
use futures::stream::{self, Stream};
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use toolscout::discovery::{
    adapters::SseTransportFactory,
    domain::{ServerName, ServerSpec, TransportSpec},
    ports::{ConnectionError, TransportFactory},
    services::CapabilityProbe,
};

type EventSender = UnboundedSender<Result<Event, Infallible>>;

#[derive(Clone, Default)]
struct StreamState {
    sender: Arc<Mutex<Option<EventSender>>>,
    ping_first: bool,
    held: Arc<Mutex<Option<Value>>>,
}

const PING_ID: &str = "srv-ping";

fn push_message(state: &StreamState, message: &Value) -> StatusCode {
    let guard = state.sender.lock().expect("state lock");
    let Some(sender) = guard.as_ref() else {
        return StatusCode::GONE;
    };
    match sender.unbounded_send(Ok(Event::default().event("message").data(message.to_string()))) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::GONE,
    }
}

async fn open_stream(
    State(state): State<StreamState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (sender, receiver) = mpsc::unbounded();
    sender
        .unbounded_send(Ok(Event::default()
            .event("endpoint")
            .data("/messages?session=1")))
        .expect("endpoint event should queue");
    *state.sender.lock().expect("state lock") = Some(sender);
    Sse::new(receiver)
}

async fn silent_stream() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(stream::empty())
}

async fn receive_message(State(state): State<StreamState>, Json(message): Json<Value>) -> StatusCode {
    let Some(id) = message.get("id").cloned() else {
        return StatusCode::ACCEPTED;
    };
    if id == PING_ID {
        let held = state.held.lock().expect("state lock").take();
        return match held {
            Some(response) if message.get("result").is_some() => push_message(&state, &response),
            _ => StatusCode::BAD_REQUEST,
        };
    }
    let result = match message.get("method").and_then(Value::as_str) {
        Some("initialize") => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "axum-sse", "version": "1.0.0"}
        }),
        Some("tools/list") => json!({
            "tools": [
                {"name": "search", "description": "Search documents", "inputSchema": {"type": "object"}}
            ]
        }),
        _ => return StatusCode::BAD_REQUEST,
    };
    let response = json!({"jsonrpc": "2.0", "id": id, "result": result});

    if state.ping_first && message.get("method") == Some(&json!("tools/list")) {
        *state.held.lock().expect("state lock") = Some(response);
        return push_message(&state, &json!({"jsonrpc": "2.0", "id": PING_ID, "method": "ping"}));
    }
    push_message(&state, &response)
}

async fn start_sse_server() -> String {
    serve_state(StreamState::default()).await
}

async fn serve_state(state: StreamState) -> String {
    let app = Router::new()
        .route("/sse", get(open_stream))
        .route("/silent", get(silent_stream))
        .route("/messages", post(receive_message))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("test listener should bind");
    let address: SocketAddr = listener.local_addr().expect("local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{address}")
}

fn sse_spec(url: &str) -> ServerSpec {
    ServerSpec::new(
        ServerName::new("remote").expect("valid name"),
        TransportSpec::event_stream(url).expect("valid url"),
    )
}

#[fixture]
fn factory() -> SseTransportFactory {
    SseTransportFactory::default()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn handshake_and_listing_over_event_stream(factory: SseTransportFactory) {
    let base = start_sse_server().await;

    let mut connection = factory
        .connect(&sse_spec(&format!("{base}/sse")))
        .await
        .expect("handshake should succeed");
    let tools = CapabilityProbe::default()
        .probe(&mut connection)
        .await
        .expect("listing should succeed");

    let search = tools.get("search").expect("search tool should be listed");
    assert_eq!(search.description(), Some("Search documents"));
    connection.close().await.expect("close should succeed");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn refused_connection_is_reported_plainly(factory: SseTransportFactory) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("probe listener should bind");
    let address = listener.local_addr().expect("local address");
    drop(listener);

    let error = factory
        .connect(&sse_spec(&format!("http://{address}/sse")))
        .await
        .expect_err("connect should fail");

    assert_eq!(error, ConnectionError::Network("connection refused".to_owned()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn non_success_status_is_reported(factory: SseTransportFactory) {
    let base = start_sse_server().await;

    let error = factory
        .connect(&sse_spec(&format!("{base}/missing")))
        .await
        .expect_err("connect should fail");

    assert_eq!(error, ConnectionError::HttpStatus(404));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stream_without_endpoint_event_fails_the_handshake(factory: SseTransportFactory) {
    let base = start_sse_server().await;

    let error = factory
        .connect(&sse_spec(&format!("{base}/silent")))
        .await
        .expect_err("connect should fail");

    assert!(
        matches!(&error, ConnectionError::Handshake(detail) if detail.contains("endpoint")),
        "unexpected error: {error}"
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn server_ping_is_answered_during_listing(factory: SseTransportFactory) {
    let base = serve_state(StreamState {
        ping_first: true,
        ..StreamState::default()
    })
    .await;

    let mut connection = factory
        .connect(&sse_spec(&format!("{base}/sse")))
        .await
        .expect("handshake should succeed");
    let tools = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        CapabilityProbe::default().probe(&mut connection),
    )
    .await
    .expect("listing should not stall")
    .expect("listing should succeed");

    assert!(tools.contains_key("search"));
    connection.close().await.expect("close should succeed");
}
