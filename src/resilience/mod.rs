//! Resilience primitives for calls into the durable store.
//!
//! - `retry`: bounded, sequential retries with exponential backoff
//! - `circuit_breaker`: Closed / Open / Half-Open gate in front of the backend

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{RetryDecision, RetryPolicy, run_with_retry};
