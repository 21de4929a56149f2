//! Wire shapes returned by the HTTP boundary.

use crate::discovery::domain::AggregatedResult;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a successful check.
///
/// Every map follows the key order of the request's `mcpServers` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    /// Whether a connection to each server was established.
    pub server_status: IndexMap<String, bool>,
    /// Error detail of every server that failed in any phase.
    pub server_errors: IndexMap<String, String>,
    /// Tool schemas of every server that connected and listed its tools.
    pub server_tools: IndexMap<String, IndexMap<String, Value>>,
}

impl From<&AggregatedResult> for CheckResponse {
    fn from(result: &AggregatedResult) -> Self {
        let mut response = Self::default();
        for (name, outcome) in result.servers() {
            response
                .server_status
                .insert(name.clone(), outcome.is_reachable());
            if let Some(detail) = outcome.error_detail() {
                response
                    .server_errors
                    .insert(name.clone(), detail.to_owned());
            }
            if outcome.is_available() {
                let tools = outcome
                    .tools()
                    .iter()
                    .map(|(tool, descriptor)| (tool.clone(), descriptor.schema().clone()))
                    .collect();
                response.server_tools.insert(name.clone(), tools);
            }
        }
        response
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is serving.
    pub status: String,
    /// Crate version.
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}
