//! Caller-facing error types.
//!
//! Request-level failures never tear down shared state: a rejected or timed
//! out request affects only its own caller. Only channel disconnects change
//! the global link state.

use std::time::Duration;

use thiserror::Error;

use crate::application::ports::TransportError;
use crate::domain::link::ChannelKind;

/// Failure of a single correlated request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The named channel was down when the request was issued, or went down
    /// before the request left the queue.
    #[error("ZMQ {} connection is closed.", channel_label(.0))]
    ChannelClosed(ChannelKind),

    /// The terminal answered with a failure status.
    #[error("{0}")]
    Remote(String),

    /// No reply arrived within the request timeout.
    #[error("request {id} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        /// Correlation id of the expired request.
        id: u64,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The request was refused before any frame was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The transport refused the outbound frame.
    #[error("transport error: {0}")]
    Transport(String),

    /// The reply did not have the expected shape.
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),

    /// The connection was never started.
    #[error("connection has not been started")]
    NotConnected,

    /// The connection shut down while the request was outstanding.
    #[error("connection shut down")]
    Shutdown,
}

impl RequestError {
    /// Metric label for this outcome.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::ChannelClosed(_) => "channel_closed",
            Self::Remote(_) => "remote_error",
            Self::Timeout { .. } => "timeout",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Transport(_) => "transport_error",
            Self::UnexpectedPayload(_) => "unexpected_payload",
            Self::NotConnected => "not_connected",
            Self::Shutdown => "shutdown",
        }
    }
}

impl From<TransportError> for RequestError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

const fn channel_label(channel: &ChannelKind) -> &'static str {
    match channel {
        ChannelKind::Request => "REQ",
        ChannelKind::Push => "PULL",
    }
}

/// Failure to start a connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// A channel transport failed to connect.
    #[error("failed to connect {channel} channel: {source}")]
    Transport {
        /// Channel that failed.
        channel: ChannelKind,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// `connect` was called on a connection that is already running.
    #[error("connection already started")]
    AlreadyStarted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_closed_names_the_socket() {
        assert_eq!(
            RequestError::ChannelClosed(ChannelKind::Request).to_string(),
            "ZMQ REQ connection is closed."
        );
        assert_eq!(
            RequestError::ChannelClosed(ChannelKind::Push).to_string(),
            "ZMQ PULL connection is closed."
        );
    }

    #[test]
    fn timeout_message_includes_id_and_duration() {
        let err = RequestError::Timeout {
            id: 4,
            timeout: Duration::from_millis(15_000),
        };
        assert_eq!(err.to_string(), "request 4 timed out after 15000ms");
        assert_eq!(err.outcome(), "timeout");
    }

    #[test]
    fn transport_error_converts() {
        let err: RequestError = TransportError::Closed.into();
        assert!(matches!(err, RequestError::Transport(_)));
    }
}
