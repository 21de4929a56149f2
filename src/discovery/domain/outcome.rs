//! Per-server outcome of one check cycle.

use super::ToolSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase in which a server check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePhase {
    /// The server specification was rejected before any connection attempt.
    Configuration,
    /// The transport could not establish a connection.
    Connect,
    /// The connection was established but capability retrieval failed.
    Probe,
}

impl FailurePhase {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Connect => "connect",
            Self::Probe => "probe",
        }
    }
}

impl fmt::Display for FailurePhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Result of attempting one server.
///
/// The constructors enforce the model invariants: an unreachable outcome
/// always has an error detail and no tools, and an error detail is present
/// on a reachable outcome only when the probe failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerOutcome {
    server_name: String,
    reachable: bool,
    error_detail: Option<String>,
    failure_phase: Option<FailurePhase>,
    tools: ToolSet,
}

impl ServerOutcome {
    /// Creates the outcome for a specification rejected before connecting.
    #[must_use]
    pub fn invalid_configuration(server_name: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::failed(
            server_name,
            false,
            FailurePhase::Configuration,
            format!("invalid configuration: {detail}"),
        )
    }

    /// Creates the outcome for a server whose connection attempt failed.
    #[must_use]
    pub fn unreachable(server_name: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::failed(server_name, false, FailurePhase::Connect, detail.to_string())
    }

    /// Creates the outcome for a connected server whose probe failed.
    #[must_use]
    pub fn probe_failed(server_name: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self::failed(server_name, true, FailurePhase::Probe, detail.to_string())
    }

    /// Creates the outcome for a server that connected and listed its tools.
    #[must_use]
    pub fn reachable(server_name: impl Into<String>, tools: ToolSet) -> Self {
        Self {
            server_name: server_name.into(),
            reachable: true,
            error_detail: None,
            failure_phase: None,
            tools,
        }
    }

    fn failed(
        server_name: impl Into<String>,
        reachable: bool,
        phase: FailurePhase,
        detail: String,
    ) -> Self {
        let trimmed = detail.trim();
        let error_detail = if trimmed.is_empty() {
            format!("{phase} failed")
        } else {
            trimmed.to_owned()
        };

        Self {
            server_name: server_name.into(),
            reachable,
            error_detail: Some(error_detail),
            failure_phase: Some(phase),
            tools: ToolSet::new(),
        }
    }

    /// Returns the server name as configured.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Returns whether a connection to the server was established.
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        self.reachable
    }

    /// Returns the error detail, if any step failed.
    #[must_use]
    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    /// Returns the phase that failed, if any.
    #[must_use]
    pub const fn failure_phase(&self) -> Option<FailurePhase> {
        self.failure_phase
    }

    /// Returns whether the server connected and its tools were retrieved.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.reachable && self.error_detail.is_none()
    }

    /// Returns the tools the server declared.
    #[must_use]
    pub const fn tools(&self) -> &ToolSet {
        &self.tools
    }
}
