//! Infrastructure Layer - Adapters and external integrations.
//!
//! - `zeromq`: REQ and PULL channel transports
//! - `config`: Settings from code or environment
//! - `telemetry`: Tracing subscriber and OTLP export
//! - `metrics`: Prometheus recorder and metric helpers
//! - `health`: Health check HTTP endpoint

/// Configuration loading and validation.
pub mod config;

/// Health check HTTP server.
pub mod health;

/// Prometheus metrics.
pub mod metrics;

/// Tracing and OpenTelemetry setup.
pub mod telemetry;

/// ZeroMQ channel transports.
pub mod zeromq;
