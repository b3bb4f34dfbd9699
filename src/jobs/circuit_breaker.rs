//! Per-upstream-service circuit breaker (§4.3 "Circuit breakers").
//!
//! One breaker guards each provider (embedding, tag extraction). State lives
//! behind a `Mutex` rather than atomics because a transition (e.g. half-open
//! probe admission) must read and mutate several fields together.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;
use crate::error::{Result, ServiceUnavailableError};

/// Externally observable breaker state, for the `circuit_breaker_state`
/// metric (§4.7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through normally.
    Closed,
    /// Calls fail fast without reaching the provider.
    Open,
    /// A single probe call is admitted to test recovery.
    HalfOpen,
}

struct Window {
    attempts: u32,
    failures: u32,
    started_at: Instant,
}

impl Window {
    fn fresh(now: Instant) -> Self {
        Self {
            attempts: 0,
            failures: 0,
            started_at: now,
        }
    }
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    window: Window,
    opened_at: Option<Instant>,
    current_open_duration: Duration,
}

/// Circuit breaker for one upstream service (§4.3).
///
/// `call` wraps a fallible operation: it fails fast with
/// [`ServiceUnavailableError::CircuitOpen`] while open, admits exactly one
/// probe in half-open, and records the outcome to drive the next transition.
pub struct CircuitBreaker {
    service: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a new closed breaker for the named service.
    pub fn new(service: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let now = Instant::now();
        Self {
            service: service.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                window: Window::fresh(now),
                opened_at: None,
                current_open_duration: config.open_duration,
            }),
        }
    }

    /// Current externally observable state.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        self.maybe_transition_to_half_open(&mut inner, Instant::now());
        inner.state
    }

    /// Runs `f`, recording success/failure and applying the state machine.
    /// Returns `ServiceUnavailable` without calling `f` if the breaker is
    /// open (or has not yet reached its half-open probe window).
    pub fn call<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let now = Instant::now();
        {
            let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
            self.maybe_transition_to_half_open(&mut inner, now);
            if inner.state == BreakerState::Open {
                return Err(ServiceUnavailableError::circuit_open(self.service.clone()).into());
            }
        }

        match f() {
            Ok(value) => {
                self.record_success(now);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(now);
                Err(err)
            }
        }
    }

    fn maybe_transition_to_half_open(&self, inner: &mut Inner, now: Instant) {
        if inner.state == BreakerState::Open {
            if let Some(opened_at) = inner.opened_at {
                if now.duration_since(opened_at) >= inner.current_open_duration {
                    inner.state = BreakerState::HalfOpen;
                }
            }
        }
        self.roll_window_if_expired(inner, now);
    }

    fn roll_window_if_expired(&self, inner: &mut Inner, now: Instant) {
        if now.duration_since(inner.window.started_at) >= self.config.rolling_window {
            inner.window = Window::fresh(now);
        }
    }

    fn record_success(&self, now: Instant) {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        inner.consecutive_failures = 0;
        inner.window.attempts += 1;
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.opened_at = None;
                inner.current_open_duration = self.config.open_duration;
                inner.window = Window::fresh(now);
            }
            BreakerState::Closed | BreakerState::Open => {}
        }
    }

    fn record_failure(&self, now: Instant) {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        inner.consecutive_failures += 1;
        inner.window.attempts += 1;
        inner.window.failures += 1;

        let rate_tripped = inner.window.attempts >= self.config.min_attempts_for_rate
            && f64::from(inner.window.failures) / f64::from(inner.window.attempts)
                >= self.config.failure_rate_threshold;
        let consecutive_tripped = inner.consecutive_failures >= self.config.consecutive_failure_threshold;

        match inner.state {
            BreakerState::HalfOpen => self.open(&mut inner, now, true),
            BreakerState::Closed if rate_tripped || consecutive_tripped => {
                self.open(&mut inner, now, false)
            }
            BreakerState::Closed | BreakerState::Open => {}
        }
    }

    fn open(&self, inner: &mut Inner, now: Instant, double_duration: bool) {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(now);
        if double_duration {
            inner.current_open_duration =
                (inner.current_open_duration * 2).min(self.config.max_open_duration);
        }
    }
}
