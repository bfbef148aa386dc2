//! Circuit breaker around the scoring dependency.
//!
//! State machine: Closed → Open → HalfOpen → Closed
//!
//! - **Closed**: calls go through; consecutive failures are counted.
//! - **Open**: calls are rejected without invoking the dependency until
//!   `recovery_timeout` has elapsed since the last failure.
//! - **HalfOpen**: a single probe is let through.
//!   - Success → Closed
//!   - Failure → Open (timer restarts)
//!
//! A call that exceeds `call_timeout` counts as a failure. One breaker is
//! shared (behind an `Arc`) by every caller of the same dependency.

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "CLOSED"),
            BreakerState::Open => write!(f, "OPEN"),
            BreakerState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Why a guarded call produced no value.
#[derive(Debug, Clone, PartialEq)]
pub enum Unavailability {
    /// Fast-failed without invoking the dependency.
    CircuitOpen,
    Failed(String),
    TimedOut(Duration),
    /// No worker slot freed up in time.
    Saturated,
}

impl fmt::Display for Unavailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailability::CircuitOpen => write!(f, "circuit open"),
            Unavailability::Failed(reason) => write!(f, "call failed: {reason}"),
            Unavailability::TimedOut(after) => write!(f, "timed out after {after:?}"),
            Unavailability::Saturated => write!(f, "scoring pool saturated"),
        }
    }
}

/// Result of a guarded call. Unavailable is never a value of `T`.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Available(T),
    Unavailable(Unavailability),
}

impl<T> CallOutcome<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, CallOutcome::Available(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerMetrics {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub total_rejected: u64,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    probe_started_at: Option<Instant>,
}

pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    call_timeout: Duration,
    inner: Mutex<BreakerInner>,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
    total_rejected: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(
        name: &str,
        failure_threshold: u32,
        recovery_timeout: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            call_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                probe_started_at: None,
            }),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        }
    }

    pub fn from_config(name: &str, config: &crate::config::BreakerConfig) -> Self {
        Self::new(
            name,
            config.failure_threshold,
            config.recovery_timeout(),
            config.call_timeout(),
        )
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Runs `operation` under breaker protection.
    ///
    /// When the breaker is open (and the recovery timeout has not elapsed)
    /// the operation is not invoked at all.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> CallOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if !self.try_acquire() {
            self.total_rejected.fetch_add(1, Ordering::Relaxed);
            return CallOutcome::Unavailable(Unavailability::CircuitOpen);
        }

        match tokio::time::timeout(self.call_timeout, operation()).await {
            Ok(Ok(value)) => {
                self.record_success();
                CallOutcome::Available(value)
            }
            Ok(Err(e)) => {
                let reason = e.to_string();
                self.record_failure(&reason);
                CallOutcome::Unavailable(Unavailability::Failed(reason))
            }
            Err(_) => {
                self.record_failure("timeout");
                CallOutcome::Unavailable(Unavailability::TimedOut(self.call_timeout))
            }
        }
    }

    fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let recovered = inner
                    .last_failure_at
                    .is_some_and(|at| at.elapsed() > self.recovery_timeout);
                if recovered {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_started_at = Some(Instant::now());
                    tracing::info!(breaker = %self.name, "circuit breaker: Open → HalfOpen (probe allowed)");
                }
                recovered
            }
            BreakerState::HalfOpen => {
                // A probe abandoned by its caller must not wedge the breaker.
                let stale = inner
                    .probe_started_at
                    .is_none_or(|at| at.elapsed() > self.call_timeout);
                if stale {
                    inner.probe_started_at = Some(Instant::now());
                }
                stale
            }
        }
    }

    fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        if inner.state == BreakerState::HalfOpen {
            inner.state = BreakerState::Closed;
            inner.probe_started_at = None;
            tracing::info!(breaker = %self.name, "circuit breaker: HalfOpen → Closed (recovered)");
        }
    }

    fn record_failure(&self, reason: &str) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        inner.last_failure_at = Some(Instant::now());
        tracing::warn!(
            breaker = %self.name,
            consecutive_failures = inner.consecutive_failures,
            failure_threshold = self.failure_threshold,
            reason,
            "circuit breaker: guarded call failed"
        );

        match inner.state {
            BreakerState::Closed => {
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    tracing::warn!(breaker = %self.name, "circuit breaker: Closed → Open (switching to fallback)");
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.probe_started_at = None;
                tracing::warn!(breaker = %self.name, "circuit breaker: HalfOpen → Open (probe failed)");
            }
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn metrics(&self) -> BreakerMetrics {
        let inner = self.inner.lock();
        BreakerMetrics {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
        }
    }
}
