//! JSON-RPC 2.0 envelopes and the MCP initialisation handshake shared by
//! both transports.

use crate::discovery::ports::{SessionError, SessionResult};
use serde_json::{Value, json};

/// MCP protocol revision announced during `initialize`.
pub(crate) const PROTOCOL_VERSION: &str = "2024-11-05";

/// Upper bound on a single decoded message.
pub(crate) const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

const DEFAULT_CLIENT_NAME: &str = "toolscout";

/// Identity this client announces in the `initialize` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    name: String,
    version: String,
}

impl ClientInfo {
    /// Creates client identity with the crate version.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }

    /// Returns the announced client name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the announced client version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_NAME)
    }
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Incoming {
    /// Response to one of our requests.
    Response {
        id: u64,
        outcome: SessionResult<Value>,
    },
    /// Request initiated by the server, which expects a reply.
    Request { id: Value, method: String },
    /// Notification or stray message, which this client ignores.
    Other,
}

/// JSON-RPC code for a method the receiver does not implement.
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;

pub(crate) fn request(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

pub(crate) fn notification(method: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
    })
}

/// Builds the reply to a server-initiated request. `ping` gets an empty
/// result; everything else is refused as unknown.
pub(crate) fn reply_to(id: Value, method: &str) -> Value {
    if method == "ping" {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {},
        })
    } else {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": METHOD_NOT_FOUND,
                "message": format!("method not found: {method}"),
            },
        })
    }
}

pub(crate) fn initialize_params(client: &ClientInfo) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {"name": client.name(), "version": client.version()},
    })
}

/// Checks that an `initialize` result looks like an MCP server's answer.
pub(crate) fn check_initialize_result(result: &Value) -> Result<(), String> {
    let has_version = result
        .get("protocolVersion")
        .and_then(Value::as_str)
        .is_some_and(|version| !version.is_empty());
    if has_version {
        Ok(())
    } else {
        Err("initialize response is missing protocolVersion".to_owned())
    }
}

pub(crate) fn encode(message: &Value) -> SessionResult<Vec<u8>> {
    serde_json::to_vec(message).map_err(|err| SessionError::Malformed(err.to_string()))
}

pub(crate) fn decode(bytes: &[u8]) -> SessionResult<Incoming> {
    if bytes.len() > MAX_MESSAGE_SIZE {
        return Err(SessionError::Malformed(format!(
            "message of {} bytes exceeds the {MAX_MESSAGE_SIZE} byte limit",
            bytes.len()
        )));
    }
    let value: Value =
        serde_json::from_slice(bytes).map_err(|err| SessionError::Malformed(err.to_string()))?;
    Ok(classify(&value))
}

fn classify(message: &Value) -> Incoming {
    if let Some(method) = message.get("method") {
        return match (message.get("id"), method.as_str()) {
            (Some(id), Some(name)) if !id.is_null() => Incoming::Request {
                id: id.clone(),
                method: name.to_owned(),
            },
            _ => Incoming::Other,
        };
    }

    let Some(id) = message.get("id").and_then(parse_id) else {
        return Incoming::Other;
    };

    if let Some(error) = message.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32000);
        let text = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_owned();
        return Incoming::Response {
            id,
            outcome: Err(SessionError::Remote {
                code,
                message: text,
            }),
        };
    }

    let outcome = message
        .get("result")
        .cloned()
        .ok_or_else(|| SessionError::Malformed("response has neither result nor error".to_owned()));
    Incoming::Response { id, outcome }
}

fn parse_id(id: &Value) -> Option<u64> {
    id.as_u64()
        .or_else(|| id.as_str().and_then(|text| text.parse().ok()))
}
