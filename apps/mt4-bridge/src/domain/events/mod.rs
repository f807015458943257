//! Bridge Events and Listener Registry
//!
//! Three families of events flow out of the connection:
//!
//! - link lifecycle (`Connect` / `Disconnect`),
//! - unsolicited terminal streams (account, orders, prices),
//! - raw observation of every frame received on either channel.
//!
//! Listeners are invoked synchronously on the connection task, in the order
//! they were registered. Registrations live as long as the dispatcher. A
//! panicking listener is logged and skipped; the connection keeps running.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;

use super::link::ChannelKind;
use super::protocol::{InboundMessage, Payload};

// =============================================================================
// Topics
// =============================================================================

/// Stream published by the terminal after a subscribe request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Account snapshots (`ACCOUNT`).
    Account,
    /// Open orders (`ORDERS`).
    Orders,
    /// Bid/ask updates (`PRICES`).
    Prices,
    /// Stream id this bridge has no dedicated variant for.
    Other(String),
}

impl StreamKind {
    /// Map the id field of a `STREAM` frame.
    #[must_use]
    pub fn from_id(id: &str) -> Self {
        match id {
            "ACCOUNT" => Self::Account,
            "ORDERS" => Self::Orders,
            "PRICES" => Self::Prices,
            other => Self::Other(other.to_string()),
        }
    }

    /// Stream id as sent by the terminal.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Account => "ACCOUNT",
            Self::Orders => "ORDERS",
            Self::Prices => "PRICES",
            Self::Other(id) => id,
        }
    }
}

/// Key listeners are registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Both channels became up.
    Connect,
    /// The link went down.
    Disconnect,
    /// A terminal stream.
    Stream(StreamKind),
    /// Every frame received on a channel.
    RawMessage(ChannelKind),
}

/// Event delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// Both channels became up.
    Connected,
    /// The link went down.
    Disconnected {
        /// Channel whose loss caused the disconnect.
        channel: ChannelKind,
    },
    /// Stream data.
    Stream {
        /// Stream the data belongs to.
        kind: StreamKind,
        /// Decoded stream payload.
        payload: Payload,
    },
    /// A decoded frame, for diagnostics.
    RawMessage {
        /// Channel the frame arrived on.
        channel: ChannelKind,
        /// The decoded frame.
        message: InboundMessage,
    },
}

impl BridgeEvent {
    /// Topic this event is published under.
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Self::Connected => Topic::Connect,
            Self::Disconnected { .. } => Topic::Disconnect,
            Self::Stream { kind, .. } => Topic::Stream(kind.clone()),
            Self::RawMessage { channel, .. } => Topic::RawMessage(*channel),
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Listener callback.
pub type Listener = Arc<dyn Fn(&BridgeEvent) + Send + Sync>;

/// Topic-keyed listener registry.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<HashMap<Topic, Vec<Listener>>>,
}

impl EventDispatcher {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it runs after every listener already registered for the topic.
    pub fn on<F>(&self, topic: Topic, listener: F)
    where
        F: Fn(&BridgeEvent) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .entry(topic)
            .or_default()
            .push(Arc::new(listener));
    }

    /// Invoke every listener of the event's topic, in registration order.
    ///
    /// Returns the number of listeners invoked. The registry lock is not held
    /// while listeners run, so a listener may register further listeners.
    pub fn publish(&self, event: &BridgeEvent) -> usize {
        let topic = event.topic();
        let snapshot = match self.listeners.read().get(&topic) {
            Some(listeners) => listeners.clone(),
            None => return 0,
        };

        tracing::trace!(topic = ?topic, listeners = snapshot.len(), "Publishing event");
        for listener in &snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(topic = ?topic, "Event listener panicked");
            }
        }
        snapshot.len()
    }

    /// Number of listeners registered for a topic.
    #[must_use]
    pub fn listener_count(&self, topic: &Topic) -> usize {
        self.listeners.read().get(topic).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read();
        f.debug_struct("EventDispatcher")
            .field("topics", &listeners.len())
            .field(
                "listeners",
                &listeners.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}
