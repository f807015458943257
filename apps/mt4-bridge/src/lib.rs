#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! MT4 Bridge - MetaTrader 4 Terminal Client
//!
//! Client-side bridge to a MetaTrader 4 expert advisor over two ZeroMQ
//! channels: a REQ socket for commands and a PULL socket for asynchronous
//! replies and unsolicited stream events. Many concurrent requests are
//! multiplexed over the single REQ socket and matched back to their callers
//! by correlation id.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Wire protocol and runtime-agnostic state
//!   - `protocol`: Frame codec, request arguments, request codes
//!   - `link`: Two-channel health tracking, connect probe
//!   - `events`: Typed topics and the listener registry
//!   - `trading`: Terminal payload types and order tickets
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Channel transport interface
//!   - `services`: Connection actor, correlator, terminal API
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `zeromq`: REQ/PULL socket workers with monitors
//!   - `config`: Configuration from code or environment
//!   - `telemetry`, `metrics`, `health`: Observability
//!
//! # Data Flow
//!
//! ```text
//!                 request()                     ┌──────────┐
//!  caller ─────────────────► ConnectionActor ──►│ REQ sock │──► terminal
//!    ▲                        │  correlator     └──────────┘       │
//!    │   reply by id          │  link state     ┌──────────┐       │
//!    └────────────────────────┤◄────────────────│ PULL sock│◄──────┘
//!                             │                 └──────────┘
//!                             └──► EventDispatcher ──► stream listeners
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Protocol, link state and event types with no I/O.
pub mod domain;

/// Application layer - Connection actor and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Caller-facing error types.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::events::{BridgeEvent, EventDispatcher, StreamKind, Topic};
pub use domain::link::{ChannelKind, LinkState, LinkTransition};
pub use domain::protocol::{
    FrameCodec, InboundMessage, MessageKind, OrderOperation, Payload, RequestArg, RequestCode,
    ResponseStatus, VolumeUnit,
};
pub use domain::trading::{Candle, Order, OrderTicket, Rates, TradingAccount};

// Application
pub use application::ports::{
    ChannelSignal, ChannelSink, ChannelTransport, TransportError, TransportEvent,
};
pub use application::services::{BridgeStatus, Mt4Connection, Mt4Terminal, StatusSnapshot};

// Errors
pub use error::{ConnectError, RequestError};

// Infrastructure config
pub use infrastructure::config::{
    BridgeConfig, ConfigError, ConnectionSettings, DelimiterPolicy, ServerSettings,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Transports
pub use infrastructure::zeromq::{ZmqChannel, ZmqSocketKind};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
