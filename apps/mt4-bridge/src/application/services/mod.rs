//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `Mt4Connection`: Connection actor, request facade and stream routing
//! - `Correlator`: Queued and pending request bookkeeping
//! - `BridgeStatus`: Lock-free status mirror for health reporting
//! - `Mt4Terminal`: Typed trading helpers and stream listeners

mod connection;
mod correlator;
mod status;
mod terminal;

pub use connection::Mt4Connection;
pub use correlator::{Correlator, Reply, RequestOutcome};
pub use status::{BridgeStatus, StatusSnapshot};
pub use terminal::Mt4Terminal;
