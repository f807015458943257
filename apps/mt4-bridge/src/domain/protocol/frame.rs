//! Frame Codec
//!
//! Encodes outbound requests and decodes inbound replies/stream events.
//!
//! Decoding never fails: malformed input yields a best-effort
//! [`InboundMessage`] with its `anomaly` field set. A payload that is not
//! valid JSON falls back to its raw tokens.

use std::borrow::Cow;

use super::{FrameAnomaly, InboundMessage, MessageKind, Payload, RequestArg, ResponseStatus};

/// Field delimiter of every frame.
pub const DELIMITER: char = '|';

const DELIMITER_STR: &str = "|";

/// Error text used when a failure frame carries no error token.
const UNKNOWN_REMOTE_ERROR: &str = "unknown remote error";

/// An encoded outbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Frame bytes ready for the request channel.
    pub bytes: Vec<u8>,
    /// Argument positions whose text contains the delimiter.
    pub collisions: Vec<usize>,
}

impl EncodedFrame {
    /// Whether the frame is ambiguous because an argument contains `|`.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        !self.collisions.is_empty()
    }

    /// Frame as text.
    #[must_use]
    pub fn as_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Codec for the `|`-delimited terminal protocol.
#[derive(Debug, Default, Clone)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Positions of arguments that contain the delimiter.
    #[must_use]
    pub fn delimiter_collisions(args: &[RequestArg]) -> Vec<usize> {
        args.iter()
            .enumerate()
            .filter(|(_, arg)| arg.contains_delimiter())
            .map(|(position, _)| position)
            .collect()
    }

    /// Encode `apiKey|correlationId|arg1|arg2|...`.
    ///
    /// Arguments containing the delimiter are still transmitted; their
    /// positions are reported in [`EncodedFrame::collisions`].
    #[must_use]
    pub fn encode(&self, api_key: &str, correlation_id: u64, args: &[RequestArg]) -> EncodedFrame {
        let mut text = format!("{api_key}{DELIMITER}{correlation_id}");
        for arg in args {
            text.push(DELIMITER);
            text.push_str(&arg.to_string());
        }

        EncodedFrame {
            bytes: text.into_bytes(),
            collisions: Self::delimiter_collisions(args),
        }
    }

    /// Correlation id of a frame built by [`Self::encode`] with `api_key`.
    #[must_use]
    pub fn outbound_correlation_id(&self, api_key: &str, bytes: &[u8]) -> Option<u64> {
        std::str::from_utf8(bytes)
            .ok()?
            .strip_prefix(api_key)?
            .strip_prefix(DELIMITER)?
            .split(DELIMITER)
            .next()?
            .parse()
            .ok()
    }

    /// Decode an inbound frame `type|id|status|...rest`.
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> InboundMessage {
        let (text, mut anomaly) = match std::str::from_utf8(bytes) {
            Ok(text) => (Cow::Borrowed(text), None),
            Err(_) => (String::from_utf8_lossy(bytes), Some(FrameAnomaly::NonUtf8)),
        };

        let fields: Vec<&str> = text.split(DELIMITER).collect();
        let kind = MessageKind::parse(fields.first().copied().unwrap_or_default());

        let [_, id, status, rest @ ..] = fields.as_slice() else {
            return InboundMessage {
                kind,
                id: fields.get(1).copied().unwrap_or_default().to_string(),
                status: None,
                error: None,
                payload: Payload::Raw(fields.iter().skip(2).map(ToString::to_string).collect()),
                anomaly: anomaly.or(Some(FrameAnomaly::MissingFields {
                    found: fields.len(),
                })),
            };
        };

        let status = ResponseStatus::parse(status);
        let (error, payload) = match &status {
            ResponseStatus::Ok => (None, decode_success(rest)),
            ResponseStatus::Failed => {
                let (error, missing) = decode_failure(rest);
                if missing {
                    anomaly = anomaly.or(Some(FrameAnomaly::MissingErrorToken));
                }
                (Some(error), Payload::Raw(Vec::new()))
            }
            ResponseStatus::Unknown(raw) => {
                anomaly = anomaly.or(Some(FrameAnomaly::UnknownStatus(raw.clone())));
                (
                    Some(format!("unrecognised response status `{raw}`")),
                    Payload::Raw(rest.iter().map(ToString::to_string).collect()),
                )
            }
        };

        InboundMessage {
            kind,
            id: (*id).to_string(),
            status: Some(status),
            error,
            payload,
            anomaly,
        }
    }
}

/// Payload of a success frame.
///
/// A lone empty field is an explicit acknowledgement. With two or more
/// fields the first one is the payload marker and is dropped.
fn decode_success(rest: &[&str]) -> Payload {
    match rest {
        [] | [""] => Payload::Ack,
        [single] => parse_payload(&[*single]),
        [_marker, data @ ..] => parse_payload(data),
    }
}

fn parse_payload(tokens: &[&str]) -> Payload {
    let joined = tokens.join(DELIMITER_STR);
    if joined.is_empty() {
        return Payload::Ack;
    }

    match serde_json::from_str(&joined) {
        Ok(value) => Payload::Structured(value),
        Err(e) => {
            tracing::trace!(error = %e, "payload is not JSON, keeping raw tokens");
            Payload::Raw(tokens.iter().map(ToString::to_string).collect())
        }
    }
}

/// Error text of a failure frame and whether the expected token was missing.
fn decode_failure(rest: &[&str]) -> (String, bool) {
    let token = match rest {
        [_marker, token, ..] if !token.is_empty() => Some((*token, false)),
        [token, ..] if !token.is_empty() => Some((*token, true)),
        _ => None,
    };

    match token {
        Some((token, misplaced)) => (
            serde_json::from_str::<String>(token).unwrap_or_else(|_| token.to_string()),
            misplaced,
        ),
        None => (UNKNOWN_REMOTE_ERROR.to_string(), true),
    }
}
