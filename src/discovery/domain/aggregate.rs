//! Aggregation of per-server outcomes into one flat tool namespace.

use super::{CheckCycleId, ServerOutcome, ToolSet};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A tool name declared by more than one server.
///
/// The flat namespace keeps the descriptor from the later server in
/// configuration order; the earlier one is shadowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCollision {
    /// Colliding tool name.
    pub tool_name: String,
    /// Server whose descriptor was overwritten.
    pub shadowed_server: String,
    /// Server whose descriptor is kept.
    pub winning_server: String,
}

/// Flattened tool namespace built from a set of outcomes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedTools {
    /// Tool name to descriptor across all available servers.
    pub tools: ToolSet,
    /// Names that were declared by more than one server.
    pub collisions: Vec<ToolCollision>,
}

/// Merges the tools of every available server into one namespace.
///
/// Servers are visited in the map's iteration order. When two servers
/// declare the same tool name, the later server's descriptor overwrites the
/// earlier one and the collision is reported.
#[must_use]
pub fn aggregate(servers: &IndexMap<String, ServerOutcome>) -> FlattenedTools {
    let mut flattened = FlattenedTools::default();
    let mut owners: IndexMap<&str, &str> = IndexMap::new();

    for (server_name, outcome) in servers {
        if !outcome.is_available() {
            continue;
        }

        for (tool_name, descriptor) in outcome.tools() {
            if let Some(previous_owner) = owners.insert(tool_name.as_str(), server_name.as_str()) {
                flattened.collisions.push(ToolCollision {
                    tool_name: tool_name.clone(),
                    shadowed_server: previous_owner.to_owned(),
                    winning_server: server_name.clone(),
                });
            }
            flattened
                .tools
                .insert(tool_name.clone(), descriptor.clone());
        }
    }

    flattened
}

/// Output of one check cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedResult {
    cycle_id: CheckCycleId,
    servers: IndexMap<String, ServerOutcome>,
    flattened: FlattenedTools,
    teardown_failures: IndexMap<String, String>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl AggregatedResult {
    /// Builds the result from outcomes ordered as the caller supplied them.
    #[must_use]
    pub fn new(
        cycle_id: CheckCycleId,
        servers: IndexMap<String, ServerOutcome>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let flattened = aggregate(&servers);
        Self {
            cycle_id,
            servers,
            flattened,
            teardown_failures: IndexMap::new(),
            started_at,
            finished_at,
        }
    }

    /// Records connections whose teardown failed.
    #[must_use]
    pub fn with_teardown_failures(mut self, failures: IndexMap<String, String>) -> Self {
        self.teardown_failures = failures;
        self
    }

    /// Returns the cycle identifier.
    #[must_use]
    pub const fn cycle_id(&self) -> CheckCycleId {
        self.cycle_id
    }

    /// Returns every server outcome, in configuration order.
    #[must_use]
    pub const fn servers(&self) -> &IndexMap<String, ServerOutcome> {
        &self.servers
    }

    /// Returns the outcome for one server.
    #[must_use]
    pub fn server(&self, server_name: &str) -> Option<&ServerOutcome> {
        self.servers.get(server_name)
    }

    /// Returns the flattened tool namespace.
    #[must_use]
    pub const fn tools(&self) -> &ToolSet {
        &self.flattened.tools
    }

    /// Returns tool names that were declared by more than one server.
    #[must_use]
    pub fn collisions(&self) -> &[ToolCollision] {
        &self.flattened.collisions
    }

    /// Returns servers whose connection failed to close cleanly.
    #[must_use]
    pub const fn teardown_failures(&self) -> &IndexMap<String, String> {
        &self.teardown_failures
    }

    /// Returns the number of reachable servers.
    #[must_use]
    pub fn reachable_count(&self) -> usize {
        self.servers
            .values()
            .filter(|outcome| outcome.is_reachable())
            .count()
    }

    /// Returns when the cycle started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns when the cycle finished.
    #[must_use]
    pub const fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }
}
