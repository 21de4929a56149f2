//! Identifier and validated-name types for check cycles and servers.

use super::InvalidSpecError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one check cycle, attached to its tracing span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckCycleId(Uuid);

impl CheckCycleId {
    /// Creates a new random cycle identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for CheckCycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CheckCycleId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Validated server name, the key of a server within a configuration batch.
///
/// Names are trimmed but otherwise kept as written: clients configure
/// servers with hyphens, dots and mixed case, and the name is echoed back
/// verbatim in responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerName(String);

impl ServerName {
    /// Creates a validated server name.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidSpecError`] when the name is empty.
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidSpecError> {
        let normalized = value.into().trim().to_owned();

        if normalized.is_empty() {
            return Err(InvalidSpecError::EmptyServerName);
        }

        Ok(Self(normalized))
    }

    /// Returns the server name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ServerName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("git", "git")]
    #[case("  remote-sse  ", "remote-sse")]
    #[case("My.Server", "My.Server")]
    fn server_name_trims_and_preserves_case(#[case] raw: &str, #[case] expected: &str) {
        let name = ServerName::new(raw).expect("name should be valid");
        assert_eq!(name.as_str(), expected);
    }

    #[test]
    fn empty_server_name_is_rejected() {
        assert_eq!(
            ServerName::new("   "),
            Err(InvalidSpecError::EmptyServerName)
        );
    }

    #[test]
    fn long_server_names_are_accepted() {
        let raw = "a".repeat(300);
        let name = ServerName::new(raw.clone()).expect("length is not limited");
        assert_eq!(name.as_str(), raw);
    }

    #[test]
    fn cycle_ids_are_unique() {
        assert_ne!(CheckCycleId::new(), CheckCycleId::new());
    }
}
