//! Scripted in-memory transport for check-cycle tests.
//!
//! Each server name is bound to a [`ServerScript`] describing how its
//! connect and `tools/list` calls behave. The factory records every session
//! it opens, and how each one ended, so tests can assert on teardown.

use crate::discovery::{
    domain::ServerSpec,
    ports::{
        Connection, ConnectionError, McpSession, SessionError, SessionResult, TransportFactory,
    },
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How the scripted server responds to a connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnectBehaviour {
    Succeed,
    Fail(ConnectionError),
    Hang,
}

/// How the scripted server responds to `tools/list`.
#[derive(Debug, Clone, PartialEq)]
enum ListingBehaviour {
    Pages(Vec<Value>),
    Fail(SessionError),
    Hang,
}

/// Scripted behaviour of one server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerScript {
    connect: ConnectBehaviour,
    connect_delay: Duration,
    listing: ListingBehaviour,
    listing_delay: Duration,
    shutdown_error: Option<SessionError>,
}

impl ServerScript {
    /// A server that connects and lists `tools` in one page.
    #[must_use]
    pub fn tools(tools: Vec<Value>) -> Self {
        Self::listing(json!({ "tools": tools }))
    }

    /// A server that connects and answers `tools/list` with `result` verbatim.
    #[must_use]
    pub fn listing(result: Value) -> Self {
        Self::with_listing(ListingBehaviour::Pages(vec![result]))
    }

    /// A server that lists its tools across several pages linked by cursors.
    #[must_use]
    pub fn paged(pages: Vec<Vec<Value>>) -> Self {
        let last = pages.len().saturating_sub(1);
        let results = pages
            .into_iter()
            .enumerate()
            .map(|(index, tools)| {
                if index < last {
                    json!({ "tools": tools, "nextCursor": (index + 1).to_string() })
                } else {
                    json!({ "tools": tools })
                }
            })
            .collect();
        Self::with_listing(ListingBehaviour::Pages(results))
    }

    /// A server whose connect attempt fails with `error`.
    #[must_use]
    pub fn connect_error(error: ConnectionError) -> Self {
        Self {
            connect: ConnectBehaviour::Fail(error),
            ..Self::tools(Vec::new())
        }
    }

    /// A server whose connect attempt never completes.
    #[must_use]
    pub fn connect_hang() -> Self {
        Self {
            connect: ConnectBehaviour::Hang,
            ..Self::tools(Vec::new())
        }
    }

    /// A server that connects but whose `tools/list` fails with `error`.
    #[must_use]
    pub fn listing_error(error: SessionError) -> Self {
        Self::with_listing(ListingBehaviour::Fail(error))
    }

    /// A server that connects but never answers `tools/list`.
    #[must_use]
    pub fn listing_hang() -> Self {
        Self::with_listing(ListingBehaviour::Hang)
    }

    /// Delays the connect step.
    #[must_use]
    pub const fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Delays every `tools/list` answer.
    #[must_use]
    pub const fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = delay;
        self
    }

    /// Makes orderly shutdown fail with `error`.
    #[must_use]
    pub fn with_shutdown_error(mut self, error: SessionError) -> Self {
        self.shutdown_error = Some(error);
        self
    }

    const fn with_listing(listing: ListingBehaviour) -> Self {
        Self {
            connect: ConnectBehaviour::Succeed,
            connect_delay: Duration::ZERO,
            listing,
            listing_delay: Duration::ZERO,
            shutdown_error: None,
        }
    }
}

/// How the sessions opened for one server ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionLedger {
    /// Connect attempts made.
    pub connect_attempts: usize,
    /// Sessions successfully opened.
    pub opened: usize,
    /// Sessions closed through orderly shutdown.
    pub shutdowns: usize,
    /// Sessions released by abort.
    pub aborts: usize,
}

impl SessionLedger {
    /// Returns how many opened sessions have been released either way.
    #[must_use]
    pub const fn released(&self) -> usize {
        self.shutdowns + self.aborts
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    scripts: HashMap<String, ServerScript>,
    ledgers: HashMap<String, SessionLedger>,
    in_flight: usize,
    peak_in_flight: usize,
}

impl ScriptState {
    fn ledger(&mut self, server: &str) -> &mut SessionLedger {
        self.ledgers.entry(server.to_owned()).or_default()
    }

    fn enter(&mut self) {
        self.in_flight += 1;
        self.peak_in_flight = self.peak_in_flight.max(self.in_flight);
    }

    fn leave(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}

/// Transport factory driven by per-server scripts.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransportFactory {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransportFactory {
    /// Creates a factory with no scripted servers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `script` to the server configured as `server`.
    ///
    /// Existing scripts are replaced.
    #[must_use]
    pub fn with_server(self, server: impl Into<String>, script: ServerScript) -> Self {
        self.lock().scripts.insert(server.into(), script);
        self
    }

    /// Returns the session ledger for `server`.
    #[must_use]
    pub fn ledger(&self, server: &str) -> SessionLedger {
        self.lock().ledgers.get(server).copied().unwrap_or_default()
    }

    /// Returns the highest number of servers that were connecting or waiting
    /// for their first listing at the same time.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.lock().peak_in_flight
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TransportFactory for ScriptedTransportFactory {
    async fn connect(&self, spec: &ServerSpec) -> Result<Connection, ConnectionError> {
        let server = spec.name().as_str().to_owned();
        let script = {
            let mut state = self.lock();
            state.ledger(&server).connect_attempts += 1;
            let script = state.scripts.get(&server).cloned().ok_or_else(|| {
                ConnectionError::Network(format!("no scripted server named '{server}'"))
            })?;
            state.enter();
            script
        };

        let guard = InFlight {
            state: Arc::clone(&self.state),
            armed: true,
        };
        tokio::time::sleep(script.connect_delay).await;
        match script.connect {
            ConnectBehaviour::Succeed => {}
            ConnectBehaviour::Fail(error) => return Err(error),
            ConnectBehaviour::Hang => std::future::pending::<()>().await,
        }

        self.lock().ledger(&server).opened += 1;
        let session = ScriptedSession {
            server,
            state: Arc::clone(&self.state),
            listing: script.listing,
            listing_delay: script.listing_delay,
            shutdown_error: script.shutdown_error,
            in_flight: true,
        };
        guard.disarm();
        Ok(Connection::new(
            spec.name().clone(),
            spec.kind(),
            Box::new(session),
        ))
    }
}

/// Leaves the in-flight count if a connect attempt ends without a session.
struct InFlight {
    state: Arc<Mutex<ScriptState>>,
    armed: bool,
}

impl InFlight {
    /// Hands the in-flight slot over to the opened session.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.armed {
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .leave();
        }
    }
}

struct ScriptedSession {
    server: String,
    state: Arc<Mutex<ScriptState>>,
    listing: ListingBehaviour,
    listing_delay: Duration,
    shutdown_error: Option<SessionError>,
    in_flight: bool,
}

impl ScriptedSession {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The server stops counting as in flight once it has answered a listing
    /// or its session has ended.
    fn settle(&mut self) {
        if self.in_flight {
            self.in_flight = false;
            self.lock().leave();
        }
    }

    fn release(&mut self, record: impl FnOnce(&mut SessionLedger)) {
        self.settle();
        record(self.lock().ledger(&self.server));
    }
}

#[async_trait]
impl McpSession for ScriptedSession {
    async fn request(&mut self, method: &str, params: Value) -> SessionResult<Value> {
        if method != "tools/list" {
            return Err(SessionError::Remote {
                code: -32601,
                message: format!("method not found: {method}"),
            });
        }

        tokio::time::sleep(self.listing_delay).await;
        let answer = match &self.listing {
            ListingBehaviour::Pages(pages) => {
                let page = params
                    .get("cursor")
                    .and_then(Value::as_str)
                    .and_then(|cursor| cursor.parse::<usize>().ok())
                    .unwrap_or(0);
                pages.get(page).cloned().ok_or_else(|| SessionError::Remote {
                    code: -32602,
                    message: "unknown cursor".to_owned(),
                })
            }
            ListingBehaviour::Fail(error) => Err(error.clone()),
            ListingBehaviour::Hang => std::future::pending().await,
        };
        self.settle();
        answer
    }

    async fn shutdown(&mut self) -> SessionResult<()> {
        self.release(|ledger| ledger.shutdowns += 1);
        self.shutdown_error.clone().map_or(Ok(()), Err)
    }

    fn abort(&mut self) {
        self.release(|ledger| ledger.aborts += 1);
    }
}
