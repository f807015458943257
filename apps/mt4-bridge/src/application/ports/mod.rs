//! Port Interfaces
//!
//! Defines the interfaces (ports) between the connection actor and the
//! socket library, following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `ChannelTransport`: one direction-specialized channel (REQ or PULL).
//!
//! Transports report back through a [`ChannelSink`]: connect/disconnect
//! signals and received frames all arrive on the actor's signal channel,
//! tagged with the channel they came from.

use tokio::sync::mpsc;
use url::Url;

use crate::domain::link::ChannelKind;

// =============================================================================
// Transport Signals
// =============================================================================

/// Signal raised by a channel transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel connected to its peer.
    Connected,
    /// A connect attempt was delayed; the library keeps retrying.
    ConnectDelayed,
    /// The channel lost its peer.
    Disconnected,
    /// A frame was received.
    Message(Vec<u8>),
    /// A frame accepted by `send` could not be written to the socket.
    SendFailed {
        /// The frame that was dropped.
        frame: Vec<u8>,
        /// Reason reported by the library.
        reason: String,
    },
}

/// A transport signal tagged with its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSignal {
    /// Channel that raised the signal.
    pub channel: ChannelKind,
    /// The signal.
    pub event: TransportEvent,
}

/// Sending half handed to a transport on connect.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    channel: ChannelKind,
    tx: mpsc::UnboundedSender<ChannelSignal>,
}

impl ChannelSink {
    /// Create a sink for the given channel.
    #[must_use]
    pub const fn new(channel: ChannelKind, tx: mpsc::UnboundedSender<ChannelSignal>) -> Self {
        Self { channel, tx }
    }

    /// Channel this sink reports for.
    #[must_use]
    pub const fn channel(&self) -> ChannelKind {
        self.channel
    }

    /// Forward a signal to the connection.
    ///
    /// Returns `false` once the connection has stopped listening.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(ChannelSignal {
                channel: self.channel,
                event,
            })
            .is_ok()
    }
}

// =============================================================================
// Channel Transport Port
// =============================================================================

/// One direction-specialized transport channel.
///
/// Implementations must not block the caller: `send` hands the frame off and
/// returns. A frame that later fails to go out is reported as `SendFailed`;
/// losing the peer is reported as `Disconnected`.
#[cfg_attr(test, mockall::automock)]
pub trait ChannelTransport: Send {
    /// Start connecting to `address`, reporting signals through `sink`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the socket cannot be created or the
    /// address is refused by the socket library.
    fn connect(&mut self, address: &Url, sink: ChannelSink) -> Result<(), TransportError>;

    /// Hand one frame to the channel.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the channel cannot accept the frame.
    fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Stop the channel and release its socket.
    fn close(&mut self) {}
}

/// Transport adapter errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Socket creation or option setup failed.
    #[error("socket setup failed: {0}")]
    Socket(String),

    /// The library refused the connect address.
    #[error("connect to {address} failed: {reason}")]
    Connect {
        /// Address that was refused.
        address: String,
        /// Reason reported by the library.
        reason: String,
    },

    /// The channel does not support sending.
    #[error("channel is receive-only")]
    ReceiveOnly,

    /// The channel has been closed or was never connected.
    #[error("channel is closed")]
    Closed,
}
