//! Circuit breaker for one external dependency.
//!
//! Tracks dependency health and stops calling a failing dependency.
//! Three states: Closed (healthy), Open (failing), HalfOpen (probing).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default consecutive failures before the breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time an Open breaker waits before letting a trial call through.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-dependency breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    /// Upper bound on one wrapped call; exceeding it counts as a failure
    pub call_timeout: Option<Duration>,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        BreakerSettings {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            call_timeout: None,
        }
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    /// Short-circuited without invoking the dependency
    #[error("circuit breaker for {dependency} is open")]
    Open { dependency: String },

    #[error("call to {dependency} timed out after {timeout:?}")]
    Timeout {
        dependency: String,
        timeout: Duration,
    },

    /// The dependency's own error
    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub dependency: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejected: u64,
}

#[derive(Debug)]
struct Health {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    last_failure: Option<DateTime<Utc>>,
    trial_in_flight: bool,
    total_calls: u64,
    total_failures: u64,
    total_rejected: u64,
}

/// Circuit breaker guarding one dependency.
///
/// State transitions happen under a short-held mutex that is never kept
/// across the wrapped call.
#[derive(Debug)]
pub struct CircuitBreaker {
    dependency: String,
    settings: BreakerSettings,
    health: Mutex<Health>,
}

impl CircuitBreaker {
    /// Create a new breaker in the Closed state.
    pub fn new(dependency: impl Into<String>, settings: BreakerSettings) -> Self {
        CircuitBreaker {
            dependency: dependency.into(),
            settings,
            health: Mutex::new(Health {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                last_failure: None,
                trial_in_flight: false,
                total_calls: 0,
                total_failures: 0,
                total_rejected: 0,
            }),
        }
    }

    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    pub fn settings(&self) -> BreakerSettings {
        self.settings
    }

    /// Run `f` through the breaker.
    ///
    /// Open breakers return [`BreakerError::Open`] without calling `f`.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire().ok_or_else(|| BreakerError::Open {
            dependency: self.dependency.clone(),
        })?;

        let outcome = match self.settings.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, f()).await {
                Ok(result) => result.map_err(BreakerError::Inner),
                Err(_) => Err(BreakerError::Timeout {
                    dependency: self.dependency.clone(),
                    timeout: limit,
                }),
            },
            None => f().await.map_err(BreakerError::Inner),
        };

        match &outcome {
            Ok(_) => permit.succeed(),
            Err(_) => permit.fail(),
        }

        outcome
    }

    /// Decide whether a call may proceed, moving Open to HalfOpen when due.
    fn acquire(&self) -> Option<Permit<'_>> {
        let mut health = self.health.lock();

        match health.state {
            CircuitState::Closed => Some(Permit::new(self, false)),
            CircuitState::Open => {
                let due = health
                    .opened_at
                    .map(|opened| opened.elapsed() >= self.settings.recovery_timeout)
                    .unwrap_or(true);
                if due {
                    health.state = CircuitState::HalfOpen;
                    health.trial_in_flight = true;
                    tracing::info!(
                        dependency = %self.dependency,
                        "Circuit breaker half-open, sending trial call"
                    );
                    Some(Permit::new(self, true))
                } else {
                    health.total_rejected += 1;
                    None
                }
            }
            CircuitState::HalfOpen => {
                if health.trial_in_flight {
                    health.total_rejected += 1;
                    None
                } else {
                    health.trial_in_flight = true;
                    Some(Permit::new(self, true))
                }
            }
        }
    }

    fn record_success(&self, trial: bool) {
        let mut health = self.health.lock();
        health.total_calls += 1;

        match health.state {
            CircuitState::Closed => {
                health.consecutive_failures = 0;
            }
            CircuitState::HalfOpen if trial => {
                health.state = CircuitState::Closed;
                health.consecutive_failures = 0;
                health.opened_at = None;
                health.trial_in_flight = false;
                tracing::info!(
                    dependency = %self.dependency,
                    "Circuit breaker closed after successful trial"
                );
            }
            // A call admitted before the breaker opened does not close it.
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn record_failure(&self, trial: bool) {
        let mut health = self.health.lock();
        health.total_calls += 1;
        health.total_failures += 1;
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.last_failure = Some(Utc::now());

        match health.state {
            CircuitState::Closed => {
                if health.consecutive_failures >= self.settings.failure_threshold {
                    health.state = CircuitState::Open;
                    health.opened_at = Some(Instant::now());
                    tracing::warn!(
                        dependency = %self.dependency,
                        consecutive_failures = health.consecutive_failures,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen if trial => {
                health.state = CircuitState::Open;
                health.opened_at = Some(Instant::now());
                health.trial_in_flight = false;
                tracing::warn!(
                    dependency = %self.dependency,
                    "Circuit breaker reopened after failed trial"
                );
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    /// Get the current circuit state.
    pub fn state(&self) -> CircuitState {
        self.health.lock().state
    }

    /// Get the current health snapshot.
    pub fn status(&self) -> BreakerStatus {
        let health = self.health.lock();
        BreakerStatus {
            dependency: self.dependency.clone(),
            state: health.state,
            consecutive_failures: health.consecutive_failures,
            last_failure: health.last_failure,
            failure_threshold: self.settings.failure_threshold,
            recovery_timeout_ms: self.settings.recovery_timeout.as_millis() as u64,
            total_calls: health.total_calls,
            total_failures: health.total_failures,
            total_rejected: health.total_rejected,
        }
    }

    /// Reset the breaker to Closed.
    pub fn reset(&self) {
        let mut health = self.health.lock();
        health.state = CircuitState::Closed;
        health.consecutive_failures = 0;
        health.opened_at = None;
        health.trial_in_flight = false;
    }
}

/// Admission for one call. Dropping an unsettled trial counts as a failed trial.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Permit {
            breaker,
            trial,
            settled: false,
        }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.record_failure(true);
        }
    }
}
