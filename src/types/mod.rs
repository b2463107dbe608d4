//! Access Layer Types
//!
//! Data structures for tokens and configuration.

pub mod config;
pub mod token;

pub use config::*;
pub use token::*;
