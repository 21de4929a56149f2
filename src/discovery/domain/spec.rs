//! Server specification value objects.

use super::{InvalidSpecError, ServerName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Launch settings for a server hosted as a local subprocess over STDIO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubprocessSpec {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_directory: Option<String>,
}

impl SubprocessSpec {
    /// Creates a new subprocess specification.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSpecError::MissingCommand`] when `command` is empty
    /// after trimming.
    pub fn new(command: impl Into<String>) -> Result<Self, InvalidSpecError> {
        let normalized_command = command.into().trim().to_owned();
        if normalized_command.is_empty() {
            return Err(InvalidSpecError::MissingCommand);
        }

        Ok(Self {
            command: normalized_command,
            args: Vec::new(),
            env: BTreeMap::new(),
            working_directory: None,
        })
    }

    /// Sets command-line arguments, in order.
    #[must_use]
    pub fn with_args(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.args = values.into_iter().collect();
        self
    }

    /// Sets the environment overlay merged onto the inherited environment.
    #[must_use]
    pub fn with_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = values.into_iter().collect();
        self
    }

    /// Sets an explicit working directory.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSpecError::EmptyWorkingDirectory`] when the
    /// provided value is empty after trimming.
    pub fn with_working_directory(
        mut self,
        value: impl Into<String>,
    ) -> Result<Self, InvalidSpecError> {
        let normalized = value.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(InvalidSpecError::EmptyWorkingDirectory);
        }

        self.working_directory = Some(normalized);
        Ok(self)
    }

    /// Returns the executable command.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns command-line arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the environment overlay.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the optional working directory.
    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }
}

/// Connection settings for a server reached over an HTTP event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStreamSpec {
    url: String,
}

impl EventStreamSpec {
    /// Creates a new event-stream specification.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSpecError`] when `url` is empty or does not start
    /// with `http://` or `https://`.
    pub fn new(url: impl Into<String>) -> Result<Self, InvalidSpecError> {
        let normalized_url = url.into().trim().to_owned();
        if normalized_url.is_empty() {
            return Err(InvalidSpecError::MissingUrl);
        }

        let has_valid_prefix =
            normalized_url.starts_with("http://") || normalized_url.starts_with("https://");
        if !has_valid_prefix {
            return Err(InvalidSpecError::InvalidUrl(normalized_url));
        }

        Ok(Self {
            url: normalized_url,
        })
    }

    /// Returns the event-stream URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Transport kind of a server specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Long-lived subprocess speaking over its standard streams.
    Subprocess,
    /// Persistent HTTP event stream.
    EventStream,
}

impl TransportKind {
    /// Returns the wire name used in configuration `type` fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subprocess => "stdio",
            Self::EventStream => "sse",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Kind-specific transport settings; exactly one kind is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "config")]
pub enum TransportSpec {
    /// Server launched as a subprocess.
    Subprocess(SubprocessSpec),
    /// Server reached over an HTTP event stream.
    EventStream(EventStreamSpec),
}

impl TransportSpec {
    /// Creates a subprocess transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`SubprocessSpec::new`].
    pub fn subprocess(command: impl Into<String>) -> Result<Self, InvalidSpecError> {
        Ok(Self::Subprocess(SubprocessSpec::new(command)?))
    }

    /// Creates an event-stream transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`EventStreamSpec::new`].
    pub fn event_stream(url: impl Into<String>) -> Result<Self, InvalidSpecError> {
        Ok(Self::EventStream(EventStreamSpec::new(url)?))
    }

    /// Returns the transport kind.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        match self {
            Self::Subprocess(_) => TransportKind::Subprocess,
            Self::EventStream(_) => TransportKind::EventStream,
        }
    }
}

/// Immutable description of how to reach one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    name: ServerName,
    transport: TransportSpec,
}

impl ServerSpec {
    /// Creates a server specification from already validated parts.
    #[must_use]
    pub const fn new(name: ServerName, transport: TransportSpec) -> Self {
        Self { name, transport }
    }

    /// Returns the server name.
    #[must_use]
    pub const fn name(&self) -> &ServerName {
        &self.name
    }

    /// Returns the transport settings.
    #[must_use]
    pub const fn transport(&self) -> &TransportSpec {
        &self.transport
    }

    /// Returns the transport kind.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        self.transport.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn subprocess_spec_rejects_blank_command() {
        assert_eq!(
            SubprocessSpec::new("  "),
            Err(InvalidSpecError::MissingCommand)
        );
    }

    #[test]
    fn subprocess_spec_keeps_argument_order() {
        let spec = SubprocessSpec::new("npx")
            .expect("valid command")
            .with_args(["-y".to_owned(), "server".to_owned(), "/tmp".to_owned()]);

        assert_eq!(spec.args(), ["-y", "server", "/tmp"]);
    }

    #[test]
    fn blank_working_directory_is_rejected() {
        let result = SubprocessSpec::new("git")
            .expect("valid command")
            .with_working_directory(" ");

        assert_eq!(result, Err(InvalidSpecError::EmptyWorkingDirectory));
    }

    #[rstest]
    #[case("", InvalidSpecError::MissingUrl)]
    #[case("   ", InvalidSpecError::MissingUrl)]
    #[case("ftp://host/sse", InvalidSpecError::InvalidUrl("ftp://host/sse".to_owned()))]
    fn event_stream_spec_validation(#[case] url: &str, #[case] expected: InvalidSpecError) {
        assert_eq!(EventStreamSpec::new(url), Err(expected));
    }

    #[rstest]
    #[case(TransportSpec::subprocess("git").expect("valid"), TransportKind::Subprocess)]
    #[case(
        TransportSpec::event_stream("http://localhost:8000/sse").expect("valid"),
        TransportKind::EventStream
    )]
    fn transport_spec_reports_kind(#[case] spec: TransportSpec, #[case] kind: TransportKind) {
        assert_eq!(spec.kind(), kind);
    }
}
