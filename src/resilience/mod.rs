//! Resilience
//!
//! Protection for outbound calls to the advertising API.
//!
//! - **Retry**: exponential backoff with an explicit attempt state
//! - **Circuit Breaker**: per-target breakers kept in a registry
//! - **Executor**: runs a call under both
//! - **Fallback**: substitute values for failed operations

pub mod circuit_breaker;
pub mod executor;
pub mod fallback;
pub mod retry;

pub use circuit_breaker::{
    BreakerPermit, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry,
    CircuitState,
};
pub use executor::ResilientExecutor;
pub use fallback::{fallback_on_error, with_fallback, WithFallback};
pub use retry::{RetryAttempt, RetryPolicy};
