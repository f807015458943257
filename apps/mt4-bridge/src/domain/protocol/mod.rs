//! Wire Protocol
//!
//! Text frames exchanged with the terminal are `|`-delimited:
//!
//! ```text
//! outbound: <apiKey>|<correlationId>|<arg1>|<arg2>|...
//! inbound:  <type>|<id>|<status>|[payload-marker]|<payload...>
//! ```

mod codes;
mod frame;

use std::fmt;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

pub use codes::{OrderOperation, RequestCode, ResponseStatus, VolumeUnit};
pub use frame::{DELIMITER, EncodedFrame, FrameCodec};

// =============================================================================
// Request Arguments
// =============================================================================

/// One positional argument of a terminal request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestArg {
    /// Free text (symbol, comment, comma-joined symbol list).
    Text(String),
    /// Integer (codes, tickets, magic numbers).
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Exact decimal (volumes and prices).
    Decimal(Decimal),
}

impl RequestArg {
    /// Whether the stringified argument would contain the frame delimiter.
    #[must_use]
    pub fn contains_delimiter(&self) -> bool {
        match self {
            Self::Text(text) => text.contains(DELIMITER),
            Self::Int(_) | Self::Float(_) | Self::Decimal(_) => false,
        }
    }
}

impl fmt::Display for RequestArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Decimal(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for RequestArg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RequestArg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for RequestArg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for RequestArg {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for RequestArg {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for RequestArg {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Decimal> for RequestArg {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// Type tag of an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Reply to a correlated request.
    Response,
    /// Unsolicited stream event.
    Stream,
    /// Any other tag (request-channel acknowledgements and the like).
    Other(String),
}

impl MessageKind {
    /// Parse the type field.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "RESPONSE" => Self::Response,
            "STREAM" => Self::Stream,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Decoded data carried by an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Explicit acknowledgement without data.
    Ack,
    /// Payload that parsed as JSON.
    Structured(serde_json::Value),
    /// Payload tokens that did not parse as JSON.
    Raw(Vec<String>),
}

impl Payload {
    /// Convert into a JSON value (`Ack` becomes `true`, raw tokens an array of strings).
    #[must_use]
    pub fn into_value(self) -> serde_json::Value {
        match self {
            Self::Ack => serde_json::Value::Bool(true),
            Self::Structured(value) => value,
            Self::Raw(tokens) => {
                serde_json::Value::Array(tokens.into_iter().map(serde_json::Value::String).collect())
            }
        }
    }

    /// Deserialize the payload into a typed value.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the payload does not have the expected shape.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.into_value())
    }
}

/// Malformed or ambiguous frame content.
///
/// Never surfaced to callers; logged at warn level and counted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameAnomaly {
    /// Frame bytes were not valid UTF-8 and were decoded lossily.
    #[error("frame is not valid UTF-8")]
    NonUtf8,
    /// Fewer than the three mandatory fields (`type|id|status`).
    #[error("frame has {found} field(s), expected at least 3")]
    MissingFields {
        /// Number of fields present.
        found: usize,
    },
    /// Status field is neither `0` nor `1`.
    #[error("unrecognised status `{0}`")]
    UnknownStatus(String),
    /// Failure frame without an error token at the expected position.
    #[error("failure frame has no error token")]
    MissingErrorToken,
    /// An outbound argument contains the frame delimiter.
    #[error("argument {position} contains the frame delimiter")]
    DelimiterCollision {
        /// Zero-based argument position.
        position: usize,
    },
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Type tag.
    pub kind: MessageKind,
    /// Correlation id (responses) or stream name (streams).
    pub id: String,
    /// Parsed status, absent when the field is missing.
    pub status: Option<ResponseStatus>,
    /// Error description of a failed response.
    pub error: Option<String>,
    /// Decoded payload.
    pub payload: Payload,
    /// Problem found while decoding, if any.
    pub anomaly: Option<FrameAnomaly>,
}

impl InboundMessage {
    /// Numeric correlation id, if the id field holds one.
    #[must_use]
    pub fn correlation_id(&self) -> Option<u64> {
        self.id.trim().parse().ok()
    }

    /// Whether the frame reports success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self.status, Some(ResponseStatus::Ok))
    }

    /// A lone token such as `OK`, the terminal's reply on the request socket.
    #[must_use]
    pub fn is_acknowledgement(&self) -> bool {
        matches!(&self.kind, MessageKind::Other(tag) if !tag.is_empty())
            && self.anomaly == Some(FrameAnomaly::MissingFields { found: 1 })
    }
}
