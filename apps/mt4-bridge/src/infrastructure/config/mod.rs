//! Configuration Module
//!
//! Configuration loading and validation for the bridge.

mod settings;

pub use settings::{
    BridgeConfig, ConfigError, ConnectionSettings, DEFAULT_API_KEY, DelimiterPolicy,
    ServerSettings, parse_address,
};
