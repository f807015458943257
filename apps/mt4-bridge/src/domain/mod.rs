//! Domain Layer - Wire protocol, link state and event types.
//!
//! Everything here is runtime-agnostic: no sockets, no tasks, no timers.

/// Frame codec, request arguments and terminal request codes.
pub mod protocol;

/// Channel health tracking and the connect-attempt probe.
pub mod link;

/// Typed topics, events and the listener registry.
pub mod events;

/// Terminal payload types and the market order ticket.
pub mod trading;
