//! Fallback
//!
//! Explicit composition of an operation with a value to use when it fails.

use std::future::Future;
use tracing::warn;

use crate::error::AccessResult;

/// Operation paired with a fallback value.
pub struct WithFallback<F, T> {
    operation: F,
    fallback: T,
}

/// Wrap `operation` so that a failure yields `fallback` instead.
pub fn with_fallback<F, Fut, T>(operation: F, fallback: T) -> WithFallback<F, T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = AccessResult<T>>,
    T: Clone,
{
    WithFallback {
        operation,
        fallback,
    }
}

impl<F, Fut, T> WithFallback<F, T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = AccessResult<T>>,
    T: Clone,
{
    /// Run the operation once.
    pub async fn call(&self) -> T {
        fallback_on_error((self.operation)(), self.fallback.clone()).await
    }

    /// Value returned on failure.
    pub fn fallback(&self) -> &T {
        &self.fallback
    }
}

/// Await `future`, replacing an error with `fallback`.
pub async fn fallback_on_error<Fut, T>(future: Fut, fallback: T) -> T
where
    Fut: Future<Output = AccessResult<T>>,
{
    match future.await {
        Ok(value) => value,
        Err(error) => {
            warn!(error = %error, kind = %error.kind(), "Operation failed, using fallback value");
            fallback
        }
    }
}
