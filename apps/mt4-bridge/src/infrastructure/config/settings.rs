//! Bridge Configuration Settings
//!
//! Configuration types for the bridge, built in code or loaded from
//! environment variables. Channel addresses are validated before any socket
//! is created.

use std::time::Duration;

use url::Url;

use crate::domain::link::ChannelKind;

/// API key the terminal ships with.
pub const DEFAULT_API_KEY: &str = "CHANGEME";

/// How an outbound argument containing `|` is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelimiterPolicy {
    /// Send the frame as is and log the collision.
    #[default]
    Warn,
    /// Refuse the request before a correlation id is allocated.
    Reject,
}

impl DelimiterPolicy {
    /// Parse policy from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "warn" => Some(Self::Warn),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    /// Get the policy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Reject => "reject",
        }
    }
}

/// Settings of one terminal connection.
#[derive(Clone)]
pub struct ConnectionSettings {
    api_key: String,
    /// Address of the terminal's REP socket.
    pub request_address: Url,
    /// Address of the terminal's PUSH socket.
    pub push_address: Url,
    /// Time a sent request may wait for its reply.
    pub request_timeout: Duration,
    /// Delay between accepting a request and sending its frame.
    pub queue_delay: Duration,
    /// Handling of arguments that contain the frame delimiter.
    pub delimiter_policy: DelimiterPolicy,
}

impl ConnectionSettings {
    /// Default request timeout.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(15_000);

    /// Default queuing delay.
    pub const DEFAULT_QUEUE_DELAY: Duration = Duration::from_millis(5);

    /// Create settings with default tunables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidAddress` if either address is not a URL
    /// with a host.
    pub fn new(
        api_key: impl Into<String>,
        request_address: &str,
        push_address: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: api_key.into(),
            request_address: parse_address(ChannelKind::Request, request_address)?,
            push_address: parse_address(ChannelKind::Push, push_address)?,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            queue_delay: Self::DEFAULT_QUEUE_DELAY,
            delimiter_policy: DelimiterPolicy::default(),
        })
    }

    /// Override the request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the queuing delay.
    #[must_use]
    pub const fn with_queue_delay(mut self, delay: Duration) -> Self {
        self.queue_delay = delay;
        self
    }

    /// Override the delimiter policy.
    #[must_use]
    pub const fn with_delimiter_policy(mut self, policy: DelimiterPolicy) -> Self {
        self.delimiter_policy = policy;
        self
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Address of a channel.
    #[must_use]
    pub const fn address(&self, channel: ChannelKind) -> &Url {
        match channel {
            ChannelKind::Request => &self.request_address,
            ChannelKind::Push => &self.push_address,
        }
    }
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("api_key", &"[REDACTED]")
            .field("request_address", &self.request_address.as_str())
            .field("push_address", &self.push_address.as_str())
            .field("request_timeout", &self.request_timeout)
            .field("queue_delay", &self.queue_delay)
            .field("delimiter_policy", &self.delimiter_policy)
            .finish()
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Terminal connection settings.
    pub connection: ConnectionSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl BridgeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or any
    /// value fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or any value fails
    /// validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = match lookup("MT4_API_KEY") {
            Some(key) if key.is_empty() => {
                return Err(ConfigError::EmptyValue("MT4_API_KEY".to_string()));
            }
            Some(key) => key,
            None => DEFAULT_API_KEY.to_string(),
        };

        let request_address = required(&lookup, "MT4_REQ_URL")?;
        let push_address = required(&lookup, "MT4_PULL_URL")?;

        let delimiter_policy = match lookup("MT4_DELIMITER_POLICY") {
            Some(raw) => DelimiterPolicy::from_str_case_insensitive(&raw).ok_or_else(|| {
                ConfigError::InvalidValue {
                    key: "MT4_DELIMITER_POLICY".to_string(),
                    value: raw,
                }
            })?,
            None => DelimiterPolicy::default(),
        };

        let connection = ConnectionSettings::new(api_key, &request_address, &push_address)?
            .with_request_timeout(parse_duration_millis(
                &lookup,
                "MT4_REQUEST_TIMEOUT_MS",
                ConnectionSettings::DEFAULT_REQUEST_TIMEOUT,
            )?)
            .with_queue_delay(parse_duration_millis(
                &lookup,
                "MT4_QUEUE_DELAY_MS",
                ConnectionSettings::DEFAULT_QUEUE_DELAY,
            )?)
            .with_delimiter_policy(delimiter_policy);

        let server = ServerSettings {
            health_port: parse_u16(
                &lookup,
                "MT4_BRIDGE_HEALTH_PORT",
                ServerSettings::default().health_port,
            )?,
        };

        Ok(Self { connection, server })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Channel address is not a usable URL.
    #[error("invalid {channel} channel address `{address}`: {reason}")]
    InvalidAddress {
        /// Channel the address belongs to.
        channel: ChannelKind,
        /// Address as supplied.
        address: String,
        /// Why it was refused.
        reason: String,
    },
    /// Environment variable could not be parsed.
    #[error("invalid value for {key}: `{value}`")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Value as supplied.
        value: String,
    },
}

/// Parse and validate a channel address.
///
/// # Errors
///
/// Returns `ConfigError::InvalidAddress` if `raw` is not a URL or has no host.
pub fn parse_address(channel: ChannelKind, raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidAddress {
        channel,
        address: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_u16<F>(lookup: &F, key: &str, default: u16) -> Result<u16, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map_or(Ok(default), |v| {
        v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v,
        })
    })
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map_or(Ok(default), |v| {
        v.parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: v,
            })
    })
}
