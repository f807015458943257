//! Channel Health Tracking
//!
//! The bridge is only usable when both channels are up. [`LinkState`]
//! folds the two per-channel flags into one logical link and reports a
//! transition exactly once per real edge: a channel flapping while the other
//! one is down never produces connect/disconnect noise.
//!
//! ```text
//!   (req, push)     set_request_up(true)     set_push_up(true)
//!  (false,false) ─────────────────────► (true,false) ─────────────► (true,true)  => Up
//!  (true, true)  ─── either set false ───────────────────────────►  (*, *)       => Down
//! ```

mod probe;

use std::fmt;

pub use probe::{CONNECT_DELAY_WARN_THRESHOLD, ConnectProbe};

/// One of the two transport channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Synchronous command channel (REQ).
    Request,
    /// Asynchronous reply/stream channel (PULL).
    Push,
}

impl ChannelKind {
    /// Both channels, request first.
    pub const ALL: [Self; 2] = [Self::Request, Self::Push];

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge of the logical link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTransition {
    /// Both channels became up.
    Up,
    /// Link was up and a channel went down.
    Down,
}

/// Up/down flags of both channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkState {
    request_up: bool,
    push_up: bool,
}

impl LinkState {
    /// Both channels down.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            request_up: false,
            push_up: false,
        }
    }

    /// Update one channel and return the logical transition it caused.
    pub fn set(&mut self, channel: ChannelKind, up: bool) -> Option<LinkTransition> {
        let was_connected = self.is_connected();
        match channel {
            ChannelKind::Request => self.request_up = up,
            ChannelKind::Push => self.push_up = up,
        }

        match (was_connected, self.is_connected()) {
            (false, true) => Some(LinkTransition::Up),
            (true, false) => Some(LinkTransition::Down),
            _ => None,
        }
    }

    /// Update the request channel flag.
    pub fn set_request_up(&mut self, up: bool) -> Option<LinkTransition> {
        self.set(ChannelKind::Request, up)
    }

    /// Update the push channel flag.
    pub fn set_push_up(&mut self, up: bool) -> Option<LinkTransition> {
        self.set(ChannelKind::Push, up)
    }

    /// Whether both channels are up.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.request_up && self.push_up
    }

    /// Whether the given channel is up.
    #[must_use]
    pub const fn is_up(&self, channel: ChannelKind) -> bool {
        match channel {
            ChannelKind::Request => self.request_up,
            ChannelKind::Push => self.push_up,
        }
    }

    /// First channel that is down, request channel first.
    #[must_use]
    pub fn first_down(&self) -> Option<ChannelKind> {
        ChannelKind::ALL.into_iter().find(|channel| !self.is_up(*channel))
    }
}
