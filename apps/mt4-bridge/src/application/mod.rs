//! Application Layer - Connection actor, request correlation and the
//! terminal API.
//!
//! This layer contains the application services and the port interface
//! that define how the domain talks to the socket library.

/// Port interfaces for the channel transports.
pub mod ports;

/// Connection actor, correlator, shared status and terminal helpers.
pub mod services;
