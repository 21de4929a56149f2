//! Error types for server specification and tool descriptor validation.

use thiserror::Error;

/// Errors returned while validating a server specification.
///
/// Every variant is recovered locally by the connection manager and surfaced
/// only as that server's outcome detail.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidSpecError {
    /// The server name is empty after trimming.
    #[error("server name must not be empty")]
    EmptyServerName,

    /// A subprocess server has no command.
    #[error("stdio server requires a non-empty command")]
    MissingCommand,

    /// The working directory is empty after trimming.
    #[error("working directory must not be empty when provided")]
    EmptyWorkingDirectory,

    /// An event-stream server has no URL.
    #[error("sse server requires a non-empty url")]
    MissingUrl,

    /// The event-stream URL does not use an HTTP scheme.
    #[error("sse url '{0}' must start with 'http://' or 'https://'")]
    InvalidUrl(String),

    /// The `type` field names a transport this crate does not speak.
    #[error("unsupported transport type '{0}'")]
    UnsupportedTransport(String),

    /// The server entry does not have the expected shape.
    #[error("malformed server entry: {0}")]
    MalformedEntry(String),
}

/// Errors returned while reading one tool out of a capability listing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidToolError {
    /// The listing entry is not a JSON object.
    #[error("tool entry must be an object")]
    NotAnObject,

    /// The listing entry has no non-empty string `name`.
    #[error("tool entry is missing a name")]
    MissingName,
}
