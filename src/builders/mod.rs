//! Builders
//!
//! Fluent builder for access layer configuration.

pub mod config;

pub use config::{access_config, AccessConfigBuilder};
