//! Core Components
//!
//! Infrastructure seams shared by the token and resilience layers.

pub mod clock;
pub mod transport;

pub use clock::*;
pub use transport::*;
