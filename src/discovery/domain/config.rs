//! Inbound configuration shape and its validation into server specs.
//!
//! The accepted document is `{"mcpServers": {<name>: <serverConfig>}}`.
//! Only a top-level shape problem fails the whole batch; a problem with one
//! entry becomes that entry's [`InvalidSpecError`].

use super::{InvalidSpecError, ServerName, ServerSpec, SubprocessSpec, TransportSpec};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Key of the server mapping in a request document.
pub const SERVERS_KEY: &str = "mcpServers";

/// Validated specifications keyed by configured name, in document order.
pub type SpecBatch = IndexMap<String, Result<ServerSpec, InvalidSpecError>>;

/// Errors returned when a request document cannot be interpreted at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputFormatError {
    /// The body is not valid JSON.
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(String),

    /// The body is JSON but not an object.
    #[error("request body must be a JSON object")]
    NotAnObject,

    /// The body has no server mapping.
    #[error("request body is missing '{SERVERS_KEY}'")]
    MissingServers,

    /// The server mapping is not an object.
    #[error("'{SERVERS_KEY}' must be an object mapping server names to configurations")]
    ServersNotAnObject,
}

/// One server entry as it appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Executable for subprocess servers.
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments for subprocess servers.
    #[serde(default)]
    pub args: Option<Vec<String>>,
    /// Endpoint for event-stream servers.
    #[serde(default)]
    pub url: Option<String>,
    /// Environment overlay for subprocess servers.
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,
    /// Working directory for subprocess servers.
    #[serde(default)]
    pub cwd: Option<String>,
    /// Transport selector; `"sse"` selects the event stream.
    #[serde(default, rename = "type")]
    pub transport_type: Option<String>,
}

impl ServerConfig {
    /// Validates the entry into a server specification.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSpecError`] when the name is invalid, the `type` is
    /// unknown, or a field required by the selected transport is missing.
    pub fn into_spec(self, name: &str) -> Result<ServerSpec, InvalidSpecError> {
        let server_name = ServerName::new(name)?;
        let selector = self
            .transport_type
            .as_deref()
            .map(|value| value.trim().to_ascii_lowercase());

        let transport = match selector.as_deref() {
            Some("sse") => TransportSpec::event_stream(self.url.unwrap_or_default())?,
            None | Some("stdio") => {
                let mut spec = SubprocessSpec::new(self.command.unwrap_or_default())?
                    .with_args(self.args.unwrap_or_default())
                    .with_env(self.env.unwrap_or_default());
                if let Some(directory) = self.cwd {
                    spec = spec.with_working_directory(directory)?;
                }
                TransportSpec::Subprocess(spec)
            }
            Some(_) => {
                return Err(InvalidSpecError::UnsupportedTransport(
                    self.transport_type.unwrap_or_default(),
                ));
            }
        };

        Ok(ServerSpec::new(server_name, transport))
    }
}

/// Parses a raw request body into a specification batch.
///
/// # Errors
///
/// Returns [`InputFormatError`] when the body is not JSON or does not have
/// the expected top-level shape.
pub fn parse_request_body(body: &[u8]) -> Result<SpecBatch, InputFormatError> {
    let document: Value = serde_json::from_slice(body)
        .map_err(|err| InputFormatError::InvalidJson(err.to_string()))?;
    parse_server_batch(&document)
}

/// Interprets a request document as a specification batch.
///
/// # Errors
///
/// Returns [`InputFormatError`] when the document or its server mapping is
/// not an object.
pub fn parse_server_batch(document: &Value) -> Result<SpecBatch, InputFormatError> {
    let servers = document
        .as_object()
        .ok_or(InputFormatError::NotAnObject)?
        .get(SERVERS_KEY)
        .ok_or(InputFormatError::MissingServers)?
        .as_object()
        .ok_or(InputFormatError::ServersNotAnObject)?;

    Ok(servers
        .iter()
        .map(|(name, entry)| (name.clone(), parse_entry(name, entry)))
        .collect())
}

fn parse_entry(name: &str, entry: &Value) -> Result<ServerSpec, InvalidSpecError> {
    if !entry.is_object() {
        return Err(InvalidSpecError::MalformedEntry(
            "server configuration must be an object".to_owned(),
        ));
    }

    let config = ServerConfig::deserialize(entry)
        .map_err(|err| InvalidSpecError::MalformedEntry(err.to_string()))?;
    config.into_spec(name)
}
