//! Circuit Breaker pattern implementation.
//!
//! Stops calling a failing backend for a cooldown window so callers fail
//! fast instead of piling up on a dead dependency.
//!
//! ## States
//!
//! - **Closed**: calls pass through; consecutive failures are counted and a
//!   success resets the count. Once the count exceeds `failure_threshold`
//!   the breaker opens.
//! - **Open**: every call is rejected without touching the backend until
//!   `cooldown` has elapsed.
//! - **Half-Open**: up to `half_open_max_probes` calls are admitted. That
//!   many consecutive successes close the breaker; any failure reopens it.
//!
//! Outcomes are reported against the generation that admitted the call, so a
//! slow call that finishes after a state change cannot corrupt the counters.
//! A [`Permit`] dropped without an outcome (the caller's future was cancelled)
//! hands its half-open slot back.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::{AppError, Result};

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Breaker opens once consecutive failures exceed this count. Default: 3
    pub failure_threshold: u32,
    /// How long the breaker stays open before probing. Default: 10s
    pub cooldown: Duration,
    /// Calls admitted while half-open. Default: 5
    pub half_open_max_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(10),
            half_open_max_probes: 5,
        }
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Admission handed out by [`CircuitBreaker::try_acquire`].
///
/// Report the outcome with [`Permit::record`]. Dropping it unrecorded frees
/// the half-open slot it held without counting a success or a failure.
#[must_use = "dropping a permit discards the call outcome"]
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl Permit<'_> {
    /// Report the outcome of the admitted call.
    pub fn record(mut self, success: bool) {
        self.settled = true;
        self.breaker.settle(self.generation, success);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release(self.generation);
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    generation: u64,
    consecutive_failures: u32,
    consecutive_successes: u32,
    probes: u32,
    opened_at: Option<Instant>,
}

/// Three-state circuit breaker guarding a backend.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    /// Create a new circuit breaker with custom configuration.
    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                consecutive_failures: 0,
                consecutive_successes: 0,
                probes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, accounting for an elapsed cooldown.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    /// Ask for permission to call the backend.
    ///
    /// Returns `None` while open, or while half-open with all probes in use.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner, Instant::now());

        match inner.state {
            CircuitState::Open => None,
            CircuitState::HalfOpen if inner.probes >= self.config.half_open_max_probes => None,
            CircuitState::HalfOpen => {
                inner.probes += 1;
                Some(self.permit(inner.generation))
            }
            CircuitState::Closed => Some(self.permit(inner.generation)),
        }
    }

    fn permit(&self, generation: u64) -> Permit<'_> {
        Permit {
            breaker: self,
            generation,
            settled: false,
        }
    }

    fn settle(&self, generation: u64, success: bool) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);

        if generation != inner.generation {
            return;
        }

        match (inner.state, success) {
            (CircuitState::Closed, true) => inner.consecutive_failures = 0,
            (CircuitState::Closed, false) => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures > self.config.failure_threshold {
                    log::error!(
                        "Circuit breaker '{}': OPEN after {} consecutive failures (cooldown {:?})",
                        self.name,
                        inner.consecutive_failures,
                        self.config.cooldown
                    );
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            }
            (CircuitState::HalfOpen, true) => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.half_open_max_probes {
                    log::info!("Circuit breaker '{}': CLOSED, backend recovered", self.name);
                    self.transition(&mut inner, CircuitState::Closed, now);
                }
            }
            (CircuitState::HalfOpen, false) => {
                log::warn!("Circuit breaker '{}': probe failed, reopening", self.name);
                self.transition(&mut inner, CircuitState::Open, now);
            }
            (CircuitState::Open, _) => {}
        }
    }

    fn release(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation == generation
            && inner.state == CircuitState::HalfOpen
            && inner.probes > 0
        {
            inner.probes -= 1;
            log::debug!(
                "Circuit breaker '{}': abandoned half-open call released ({} in use)",
                self.name,
                inner.probes
            );
        }
    }

    /// Run `f` under the breaker.
    ///
    /// Rejected calls return [`AppError::CircuitOpen`] without running `f`.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self
            .try_acquire()
            .ok_or_else(|| AppError::CircuitOpen(self.name.clone()))?;

        let result = f().await;
        permit.record(result.is_ok());
        result
    }

    fn refresh(&self, inner: &mut Inner, now: Instant) {
        if inner.state != CircuitState::Open {
            return;
        }
        let cooled = inner
            .opened_at
            .is_some_and(|at| now.duration_since(at) >= self.config.cooldown);
        if cooled {
            log::info!(
                "Circuit breaker '{}': HALF-OPEN, admitting up to {} probes",
                self.name,
                self.config.half_open_max_probes
            );
            self.transition(inner, CircuitState::HalfOpen, now);
        }
    }

    fn transition(&self, inner: &mut Inner, state: CircuitState, now: Instant) {
        inner.state = state;
        inner.generation += 1;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.probes = 0;
        inner.opened_at = (state == CircuitState::Open).then_some(now);
    }
}
