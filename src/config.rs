//! Service configuration read from environment variables.
//!
//! - `TOOLSCOUT_BIND`: listen address (default `127.0.0.1:3100`)
//! - `TOOLSCOUT_CONNECT_TIMEOUT_SECS`: per-server connect deadline (unset: none)
//! - `TOOLSCOUT_PROBE_TIMEOUT_SECS`: per-server probe deadline (unset: none)
//! - `TOOLSCOUT_MAX_CONCURRENCY`: servers checked at once (unset: unbounded)
//! - `TOOLSCOUT_CLIENT_NAME`: name announced in `initialize` (default `toolscout`)
//!
//! Empty values count as unset.

use crate::discovery::services::CheckOptions;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error;

/// Variable holding the listen address.
pub const BIND_VAR: &str = "TOOLSCOUT_BIND";
/// Variable holding the connect deadline in seconds.
pub const CONNECT_TIMEOUT_VAR: &str = "TOOLSCOUT_CONNECT_TIMEOUT_SECS";
/// Variable holding the probe deadline in seconds.
pub const PROBE_TIMEOUT_VAR: &str = "TOOLSCOUT_PROBE_TIMEOUT_SECS";
/// Variable holding the concurrency cap.
pub const MAX_CONCURRENCY_VAR: &str = "TOOLSCOUT_MAX_CONCURRENCY";
/// Variable holding the announced client name.
pub const CLIENT_NAME_VAR: &str = "TOOLSCOUT_CLIENT_NAME";

const DEFAULT_BIND: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
    3100,
);
const DEFAULT_CLIENT_NAME: &str = "toolscout";

/// Errors returned for unusable configuration values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The value is not a socket address.
    #[error("{variable} must be a socket address such as 127.0.0.1:3100, got '{value}'")]
    InvalidAddress {
        /// Offending variable.
        variable: &'static str,
        /// Value that failed to parse.
        value: String,
    },

    /// The value is not a positive whole number.
    #[error("{variable} must be a positive whole number, got '{value}'")]
    InvalidNumber {
        /// Offending variable.
        variable: &'static str,
        /// Value that failed to parse.
        value: String,
    },
}

/// Runtime configuration of the `toolscout` service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoutConfig {
    bind_address: SocketAddr,
    client_name: String,
    check_options: CheckOptions,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND,
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            check_options: CheckOptions::default(),
        }
    }
}

impl ScoutConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a variable is set to an unusable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(value) = read(BIND_VAR) {
            config.bind_address = value.parse().map_err(|_| ConfigError::InvalidAddress {
                variable: BIND_VAR,
                value: value.clone(),
            })?;
        }
        if let Some(name) = read(CLIENT_NAME_VAR) {
            config.client_name = name;
        }

        let mut options = CheckOptions::new();
        if let Some(value) = read(CONNECT_TIMEOUT_VAR) {
            options = options.with_connect_timeout(parse_seconds(CONNECT_TIMEOUT_VAR, &value)?);
        }
        if let Some(value) = read(PROBE_TIMEOUT_VAR) {
            options = options.with_probe_timeout(parse_seconds(PROBE_TIMEOUT_VAR, &value)?);
        }
        if let Some(value) = read(MAX_CONCURRENCY_VAR) {
            options = options.with_max_concurrency(parse_positive(MAX_CONCURRENCY_VAR, &value)?);
        }
        config.check_options = options;

        Ok(config)
    }

    /// Replaces the listen address.
    #[must_use]
    pub const fn with_bind_address(mut self, address: SocketAddr) -> Self {
        self.bind_address = address;
        self
    }

    /// Returns the listen address.
    #[must_use]
    pub const fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Returns the client name announced during the handshake.
    #[must_use]
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Returns the check-cycle options.
    #[must_use]
    pub const fn check_options(&self) -> CheckOptions {
        self.check_options
    }
}

fn parse_positive(variable: &'static str, value: &str) -> Result<NonZeroUsize, ConfigError> {
    value
        .parse::<NonZeroUsize>()
        .map_err(|_| ConfigError::InvalidNumber {
            variable,
            value: value.to_owned(),
        })
}

fn parse_seconds(variable: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .ok()
        .filter(|seconds| *seconds > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidNumber {
            variable,
            value: value.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ScoutConfig, ConfigError> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        ScoutConfig::from_lookup(|name| values.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).expect("empty environment is valid");

        assert_eq!(config, ScoutConfig::default());
        assert_eq!(config.bind_address().to_string(), "127.0.0.1:3100");
        assert_eq!(config.client_name(), "toolscout");
        assert_eq!(config.check_options(), CheckOptions::new());
    }

    #[test]
    fn all_variables_are_read() {
        let config = config_from(&[
            (BIND_VAR, "0.0.0.0:8080"),
            (CONNECT_TIMEOUT_VAR, "5"),
            (PROBE_TIMEOUT_VAR, " 10 "),
            (MAX_CONCURRENCY_VAR, "4"),
            (CLIENT_NAME_VAR, "scout-ci"),
        ])
        .expect("configuration should be valid");

        assert_eq!(config.bind_address().to_string(), "0.0.0.0:8080");
        assert_eq!(config.client_name(), "scout-ci");
        let options = config.check_options();
        assert_eq!(options.connect_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(options.probe_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(options.max_concurrency(), NonZeroUsize::new(4));
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config =
            config_from(&[(BIND_VAR, ""), (CLIENT_NAME_VAR, "  ")]).expect("blank values are ignored");

        assert_eq!(config, ScoutConfig::default());
    }

    #[rstest]
    #[case(CONNECT_TIMEOUT_VAR, "0")]
    #[case(PROBE_TIMEOUT_VAR, "soon")]
    #[case(MAX_CONCURRENCY_VAR, "0")]
    #[case(MAX_CONCURRENCY_VAR, "-2")]
    fn unusable_numbers_are_rejected(#[case] variable: &'static str, #[case] value: &str) {
        assert_eq!(
            config_from(&[(variable, value)]),
            Err(ConfigError::InvalidNumber {
                variable,
                value: value.to_owned(),
            })
        );
    }

    #[test]
    fn unparseable_address_is_rejected() {
        assert!(matches!(
            config_from(&[(BIND_VAR, "localhost")]),
            Err(ConfigError::InvalidAddress { .. })
        ));
    }
}
