//! Capability probe: asks a connected server for its tool set.

use crate::discovery::{
    domain::{ToolDescriptor, ToolSet},
    ports::{Connection, SessionError},
};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

const TOOLS_LIST: &str = "tools/list";
const DEFAULT_MAX_PAGES: usize = 64;

/// Errors returned while retrieving a server's tools.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// The server closed the transport or it failed before answering.
    #[error("server did not respond: {0}")]
    NoResponse(String),

    /// The server answered `tools/list` with an error.
    #[error("server reported an error listing tools ({code}): {message}")]
    Remote {
        /// JSON-RPC error code.
        code: i64,
        /// Error message reported by the server.
        message: String,
    },

    /// The listing did not have the expected shape.
    #[error("malformed tool listing: {0}")]
    Malformed(String),

    /// The probe exceeded its deadline.
    #[error("tool listing timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl From<SessionError> for ProbeError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Closed => Self::NoResponse("transport closed".to_owned()),
            SessionError::Io(message) => Self::NoResponse(message),
            SessionError::Remote { code, message } => Self::Remote { code, message },
            SessionError::Malformed(message) => Self::Malformed(message),
        }
    }
}

/// Retrieves the tool set of a connected server.
///
/// One `tools/list` round trip per page. Pages are followed through
/// `nextCursor` up to a fixed limit; failures are not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityProbe {
    max_pages: usize,
}

impl Default for CapabilityProbe {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl CapabilityProbe {
    /// Creates a probe that follows at most `max_pages` listing pages.
    #[must_use]
    pub fn with_max_pages(max_pages: usize) -> Self {
        Self {
            max_pages: max_pages.max(1),
        }
    }

    /// Lists the tools exposed over `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError`] when the server does not answer, reports an
    /// error, or sends a listing without a `tools` array, with an invalid
    /// entry, or with the same tool name twice.
    pub async fn probe(&self, connection: &mut Connection) -> Result<ToolSet, ProbeError> {
        let mut tools = ToolSet::new();
        let mut cursor: Option<String> = None;

        for _ in 0..self.max_pages {
            let params = cursor
                .as_ref()
                .map_or_else(|| json!({}), |next| json!({ "cursor": next }));
            let mut page = connection.request(TOOLS_LIST, params).await?;

            let Some(Value::Array(entries)) = page.get_mut("tools").map(Value::take) else {
                return Err(ProbeError::Malformed(
                    "result has no 'tools' array".to_owned(),
                ));
            };
            for entry in entries {
                let descriptor = ToolDescriptor::from_listing(entry)
                    .map_err(|err| ProbeError::Malformed(err.to_string()))?;
                let name = descriptor.name().to_owned();
                if tools.contains_key(&name) {
                    return Err(ProbeError::Malformed(format!(
                        "tool '{name}' is listed more than once"
                    )));
                }
                tools.insert(name, descriptor);
            }

            cursor = page
                .get("nextCursor")
                .and_then(Value::as_str)
                .filter(|next| !next.is_empty())
                .map(str::to_owned);
            if cursor.is_none() {
                return Ok(tools);
            }
        }

        Err(ProbeError::Malformed(format!(
            "tool listing exceeded {} pages",
            self.max_pages
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::domain::{ServerName, TransportKind};
    use crate::discovery::ports::MockMcpSession;
    use rstest::rstest;

    fn connection(session: MockMcpSession) -> Connection {
        Connection::new(
            ServerName::new("git").expect("valid name"),
            TransportKind::Subprocess,
            Box::new(session),
        )
    }

    fn answering(result: Value) -> MockMcpSession {
        let mut session = MockMcpSession::new();
        session
            .expect_request()
            .times(1)
            .returning(move |_, _| Ok(result.clone()));
        session.expect_abort().return_const(());
        session
    }

    #[tokio::test]
    async fn lists_tools_in_declaration_order() {
        let mut conn = connection(answering(json!({
            "tools": [
                {"name": "log", "inputSchema": {"type": "object"}},
                {"name": "diff", "description": "Show changes"}
            ]
        })));

        let tools = CapabilityProbe::default()
            .probe(&mut conn)
            .await
            .expect("probe should succeed");

        assert_eq!(tools.keys().collect::<Vec<_>>(), vec!["log", "diff"]);
        assert_eq!(
            tools.get("diff").and_then(ToolDescriptor::description),
            Some("Show changes")
        );
    }

    #[tokio::test]
    async fn follows_next_cursor_until_exhausted() {
        let mut session = MockMcpSession::new();
        session.expect_request().times(2).returning(|_, params| {
            if params.get("cursor").is_some() {
                Ok(json!({"tools": [{"name": "diff"}]}))
            } else {
                Ok(json!({"tools": [{"name": "log"}], "nextCursor": "page-2"}))
            }
        });
        session.expect_abort().return_const(());
        let mut conn = connection(session);

        let tools = CapabilityProbe::default()
            .probe(&mut conn)
            .await
            .expect("probe should succeed");

        assert_eq!(tools.keys().collect::<Vec<_>>(), vec!["log", "diff"]);
    }

    #[tokio::test]
    async fn endless_pagination_is_cut_off() {
        let mut session = MockMcpSession::new();
        session
            .expect_request()
            .times(2)
            .returning(|_, _| Ok(json!({"tools": [], "nextCursor": "again"})));
        session.expect_abort().return_const(());
        let mut conn = connection(session);

        let result = CapabilityProbe::with_max_pages(2).probe(&mut conn).await;

        assert!(matches!(result, Err(ProbeError::Malformed(_))));
    }

    #[rstest]
    #[case(json!({}))]
    #[case(json!({"tools": {"log": {}}}))]
    #[case(json!({"tools": ["log"]}))]
    #[case(json!({"tools": [{"description": "nameless"}]}))]
    #[case(json!({"tools": [{"name": "log"}, {"name": "log"}]}))]
    #[tokio::test]
    async fn malformed_listings_are_rejected(#[case] result: Value) {
        let mut conn = connection(answering(result));

        let outcome = CapabilityProbe::default().probe(&mut conn).await;

        assert!(matches!(outcome, Err(ProbeError::Malformed(_))));
    }

    #[tokio::test]
    async fn remote_error_is_reported() {
        let mut session = MockMcpSession::new();
        session.expect_request().times(1).returning(|_, _| {
            Err(SessionError::Remote {
                code: -32601,
                message: "method not found".to_owned(),
            })
        });
        session.expect_abort().return_const(());
        let mut conn = connection(session);

        let outcome = CapabilityProbe::default().probe(&mut conn).await;

        assert_eq!(
            outcome,
            Err(ProbeError::Remote {
                code: -32601,
                message: "method not found".to_owned(),
            })
        );
    }

    #[test]
    fn closed_transport_means_no_response() {
        assert_eq!(
            ProbeError::from(SessionError::Closed),
            ProbeError::NoResponse("transport closed".to_owned())
        );
    }
}
