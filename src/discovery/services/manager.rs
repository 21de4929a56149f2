//! Connection manager: runs one check cycle over a batch of servers.

use super::{CapabilityProbe, ProbeError};
use crate::discovery::{
    domain::{AggregatedResult, CheckCycleId, ServerOutcome, ServerSpec, SpecBatch},
    ports::{Connection, ConnectionError, TransportFactory},
};
use futures::future::join_all;
use indexmap::IndexMap;
use mockable::Clock;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Per-cycle limits. Everything is unbounded by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckOptions {
    connect_timeout: Option<Duration>,
    probe_timeout: Option<Duration>,
    max_concurrency: Option<NonZeroUsize>,
}

impl CheckOptions {
    /// Creates options with no deadlines and no concurrency cap.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: None,
            probe_timeout: None,
            max_concurrency: None,
        }
    }

    /// Bounds each server's connect step.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Bounds each server's probe step.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Caps how many servers are checked at once.
    #[must_use]
    pub const fn with_max_concurrency(mut self, limit: NonZeroUsize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Returns the connect deadline, if any.
    #[must_use]
    pub const fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Returns the probe deadline, if any.
    #[must_use]
    pub const fn probe_timeout(&self) -> Option<Duration> {
        self.probe_timeout
    }

    /// Returns the concurrency cap, if any.
    #[must_use]
    pub const fn max_concurrency(&self) -> Option<NonZeroUsize> {
        self.max_concurrency
    }
}

/// Checks a batch of servers concurrently and aggregates their tools.
///
/// Every server runs in its own task. A failing or panicking server only
/// affects its own outcome. Connections that survive their probe are closed
/// once every task has settled. Dropping the future returned by
/// [`ConnectionManager::check_all`] aborts the tasks, and every connection
/// they own releases its transport on drop.
pub struct ConnectionManager<F, C>
where
    F: TransportFactory + 'static,
    C: Clock + Send + Sync,
{
    factory: Arc<F>,
    clock: Arc<C>,
    probe: CapabilityProbe,
    options: CheckOptions,
}

impl<F, C> ConnectionManager<F, C>
where
    F: TransportFactory + 'static,
    C: Clock + Send + Sync,
{
    /// Creates a manager with default options.
    #[must_use]
    pub fn new(factory: Arc<F>, clock: Arc<C>) -> Self {
        Self {
            factory,
            clock,
            probe: CapabilityProbe::default(),
            options: CheckOptions::default(),
        }
    }

    /// Replaces the cycle options.
    #[must_use]
    pub const fn with_options(mut self, options: CheckOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the capability probe.
    #[must_use]
    pub const fn with_probe(mut self, probe: CapabilityProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Returns the cycle options.
    #[must_use]
    pub const fn options(&self) -> &CheckOptions {
        &self.options
    }

    /// Runs one check cycle.
    ///
    /// Returns exactly one outcome per entry of `specs`, in the order of
    /// `specs`. Per-server failures are recorded in the outcomes; this call
    /// itself does not fail.
    pub async fn check_all(&self, specs: SpecBatch) -> AggregatedResult {
        let cycle_id = CheckCycleId::new();
        let span = tracing::info_span!("check_cycle", cycle_id = %cycle_id, servers = specs.len());
        self.run_cycle(cycle_id, specs).instrument(span).await
    }

    async fn run_cycle(&self, cycle_id: CheckCycleId, specs: SpecBatch) -> AggregatedResult {
        let started_at = self.clock.utc();
        let started = Instant::now();
        tracing::info!("check cycle started");

        let order: Vec<String> = specs.keys().cloned().collect();
        let mut outcomes: HashMap<String, ServerOutcome> = HashMap::with_capacity(order.len());
        let limiter = self
            .options
            .max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit.get())));

        let mut units = JoinSet::new();
        let mut unit_names = HashMap::new();
        for (key, entry) in specs {
            match entry {
                Ok(spec) => {
                    let unit = CheckUnit {
                        factory: Arc::clone(&self.factory),
                        probe: self.probe,
                        options: self.options,
                        limiter: limiter.clone(),
                    };
                    let handle = units.spawn(unit.run(key.clone(), spec));
                    unit_names.insert(handle.id(), key);
                }
                Err(err) => {
                    tracing::warn!(server = %key, phase = "configuration", error = %err, "invalid server configuration");
                    outcomes.insert(key.clone(), ServerOutcome::invalid_configuration(key, err));
                }
            }
        }

        let mut retained = Vec::new();
        while let Some(joined) = units.join_next_with_id().await {
            match joined {
                Ok((_, report)) => {
                    if let Some(connection) = report.connection {
                        retained.push((report.key.clone(), connection));
                    }
                    outcomes.insert(report.key, report.outcome);
                }
                Err(err) => {
                    if let Some(key) = unit_names.remove(&err.id()) {
                        tracing::warn!(server = %key, error = %err, "check task failed");
                        let outcome =
                            ServerOutcome::unreachable(&key, format!("check task failed: {err}"));
                        outcomes.insert(key, outcome);
                    }
                }
            }
        }

        let teardown_failures = close_all(retained).await;

        let servers: IndexMap<String, ServerOutcome> = order
            .into_iter()
            .map(|key| {
                let outcome = outcomes.remove(&key).unwrap_or_else(|| {
                    ServerOutcome::unreachable(&key, "check task failed: no outcome recorded")
                });
                (key, outcome)
            })
            .collect();

        let result = AggregatedResult::new(cycle_id, servers, started_at, self.clock.utc())
            .with_teardown_failures(teardown_failures);

        for collision in result.collisions() {
            tracing::warn!(
                tool = %collision.tool_name,
                shadowed = %collision.shadowed_server,
                winner = %collision.winning_server,
                "tool name declared by more than one server"
            );
        }
        tracing::info!(
            servers = result.servers().len(),
            reachable = result.reachable_count(),
            tools = result.tools().len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "check cycle finished"
        );
        result
    }
}

/// Work for one server: connect, probe, and hand the connection back.
struct CheckUnit<F> {
    factory: Arc<F>,
    probe: CapabilityProbe,
    options: CheckOptions,
    limiter: Option<Arc<Semaphore>>,
}

struct UnitReport {
    key: String,
    outcome: ServerOutcome,
    connection: Option<Connection>,
}

impl<F: TransportFactory> CheckUnit<F> {
    async fn run(self, key: String, spec: ServerSpec) -> UnitReport {
        let _permit = match self.limiter {
            Some(limiter) => limiter.acquire_owned().await.ok(),
            None => None,
        };

        let connected = within(self.options.connect_timeout, self.factory.connect(&spec))
            .await
            .unwrap_or_else(|limit| Err(ConnectionError::Timeout(limit)));
        let mut connection = match connected {
            Ok(connection) => connection,
            Err(err) => {
                tracing::warn!(server = %key, phase = "connect", error = %err, "server unreachable");
                let outcome = ServerOutcome::unreachable(&key, &err);
                return UnitReport {
                    key,
                    outcome,
                    connection: None,
                };
            }
        };

        let listed = within(self.options.probe_timeout, self.probe.probe(&mut connection))
            .await
            .unwrap_or_else(|limit| Err(ProbeError::Timeout(limit)));
        match listed {
            Ok(tools) => {
                tracing::debug!(server = %key, tools = tools.len(), "server probed");
                let outcome = ServerOutcome::reachable(&key, tools);
                UnitReport {
                    key,
                    outcome,
                    connection: Some(connection),
                }
            }
            Err(err) => {
                tracing::warn!(server = %key, phase = "probe", error = %err, "tool listing failed");
                if let Err(teardown) = connection.close().await {
                    tracing::warn!(server = %key, error = %teardown, "failed to close connection");
                }
                let outcome = ServerOutcome::probe_failed(&key, &err);
                UnitReport {
                    key,
                    outcome,
                    connection: None,
                }
            }
        }
    }
}

async fn within<T>(limit: Option<Duration>, work: impl Future<Output = T>) -> Result<T, Duration> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_elapsed| limit),
        None => Ok(work.await),
    }
}

/// Closes every connection, attempting all of them even when some fail.
async fn close_all(connections: Vec<(String, Connection)>) -> IndexMap<String, String> {
    let closed = join_all(
        connections
            .into_iter()
            .map(|(key, connection)| async move { (key, connection.close().await) }),
    )
    .await;

    closed
        .into_iter()
        .filter_map(|(key, result)| {
            result.err().map(|err| {
                tracing::warn!(server = %key, error = %err, "failed to close connection");
                (key, err.to_string())
            })
        })
        .collect()
}
