//! Configuration types holding the parameters required to build a connection pool.
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde_aux::field_attributes::{
    deserialize_number_from_string, deserialize_option_number_from_string,
};

use crate::pool::PoolError;

/// The identity of the remote target a pool connects to.
///
/// Two pools are considered the same pool if, and only if, they target the same endpoint.
///
/// # Example
///
/// ```rust
/// use rendezvous_pool::Endpoint;
///
/// let endpoint: Endpoint = "https://storage.example.com".parse().unwrap();
/// assert_eq!("storage.example.com", endpoint.host());
/// assert_eq!(443, endpoint.port());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct Endpoint {
    scheme: String,
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, ready to be handed to a socket connector.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    fn default_port(scheme: &str) -> Option<u16> {
        match scheme {
            "http" | "tcp" | "ws" => Some(80),
            "https" | "wss" => Some(443),
            _ => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority())
    }
}

impl FromStr for Endpoint {
    type Err = anyhow::Error;

    /// Parses `scheme://host[:port][/path]`. The path, if any, is ignored: pools are keyed
    /// by authority.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .with_context(|| format!("`{s}` is missing a scheme (e.g. `https://`)"))?;
        if scheme.is_empty() {
            anyhow::bail!("`{s}` has an empty scheme");
        }
        let scheme = scheme.to_ascii_lowercase();
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            // IPv6 literal, e.g. `[::1]:8080`
            let (host, after) = bracketed
                .split_once(']')
                .with_context(|| format!("`{s}` has an unterminated IPv6 literal"))?;
            (host, after.strip_prefix(':'))
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };
        if host.is_empty() {
            anyhow::bail!("`{s}` has an empty host");
        }

        let port = match port {
            Some(port) => port
                .parse::<u16>()
                .with_context(|| format!("`{port}` is not a valid port"))?,
            None => Self::default_port(&scheme)
                .with_context(|| format!("No default port is known for scheme `{scheme}`"))?,
        };

        Ok(Self::new(scheme, host, port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Deserialize, Clone)]
/// Configuration of a connection pool.
///
/// Values are fixed at construction: a running pool does not reload them.
///
/// You can use `PoolSettings::default()` to get a configuration suitable for most HTTP-like
/// endpoints.
pub struct PoolSettings {
    /// The maximum number of connections open at the same time, across all the pools a
    /// [`PoolFactory`](crate::PoolFactory) builds from these settings.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_connections: usize,
    /// The maximum number of connections open at the same time towards a single endpoint.
    ///
    /// When unset (or zero), a single pool may use up to `max_connections`.
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub max_connections_per_host: Option<usize>,
    /// How many commands a connection serves before it is retired and replaced.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_connection_reuse: usize,
    /// How many connection-level failures the pool tolerates before shutting down.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_session_failures: usize,
    /// How long a checkout waits for an idle connection before giving up, in seconds.
    pub checkout_timeout_seconds: Option<u64>,
    /// How many replayable commands can wait for re-dispatch at the same time.
    #[serde(
        default = "default_resubmit_queue_capacity",
        deserialize_with = "deserialize_number_from_string"
    )]
    pub resubmit_queue_capacity: usize,
}

const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(5);

fn default_resubmit_queue_capacity() -> usize {
    64
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 20,
            max_connections_per_host: None,
            max_connection_reuse: 75,
            max_session_failures: 2,
            checkout_timeout_seconds: Some(5),
            resubmit_queue_capacity: default_resubmit_queue_capacity(),
        }
    }
}

impl PoolSettings {
    /// The connection bound applied to a single pool.
    ///
    /// The per-host limit wins when it is set to a non-zero value.
    pub fn effective_max_connections(&self) -> usize {
        match self.max_connections_per_host {
            Some(per_host) if per_host != 0 => per_host,
            _ => self.max_connections,
        }
    }

    /// Retrieve the checkout timeout, defaulting to 5 seconds if left unspecified.
    pub fn checkout_timeout(&self) -> Duration {
        self.checkout_timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CHECKOUT_TIMEOUT)
    }

    /// Reject values a pool cannot operate with.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.effective_max_connections() < 1 {
            return Err(PoolError::InvalidArgument(
                "max_connections must be positive".into(),
            ));
        }
        if self.max_connection_reuse < 1 {
            return Err(PoolError::InvalidArgument(
                "max_connection_reuse must be positive".into(),
            ));
        }
        if self.max_session_failures < 1 {
            return Err(PoolError::InvalidArgument(
                "max_session_failures must be positive".into(),
            ));
        }
        if self.resubmit_queue_capacity < 1 {
            return Err(PoolError::InvalidArgument(
                "resubmit_queue_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}
