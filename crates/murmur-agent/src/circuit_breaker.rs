//! Circuit breaker for upstream call protection
//!
//! Implements the circuit breaker pattern to prevent cascading failures when the
//! content generator or the relay transport starts failing repeatedly.

use murmur_core::config::CircuitSection;
use murmur_core::{MurmurError, Result};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests allowed
    Closed,
    /// Too many failures - reject requests immediately
    Open,
    /// Testing recovery - allow a limited number of probes
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Thresholds for a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a probe
    pub timeout: Duration,
    /// Probes admitted while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }
}

impl From<&CircuitSection> for CircuitConfig {
    fn from(section: &CircuitSection) -> Self {
        Self {
            failure_threshold: section.failure_threshold,
            timeout: Duration::from_secs(section.timeout_secs),
            half_open_max_calls: section.half_open_max_calls,
        }
    }
}

/// Internal phase; carries only the data valid for that state
#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { opened_at: Instant },
    HalfOpen { probes_issued: u32 },
}

impl Phase {
    fn tag(&self) -> CircuitState {
        match self {
            Phase::Closed => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// How a call got through the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

/// Circuit breaker to prevent cascading failures
///
/// # States
///
/// - **Closed**: Normal operation, all requests allowed
/// - **Open**: Too many failures, reject requests immediately
/// - **HalfOpen**: After timeout, allow `half_open_max_calls` probes to test recovery
///
/// Admission and outcome bookkeeping each take the lock briefly; the guarded
/// operation itself runs without it, so a slow upstream never blocks `state()`.
///
/// # Example
///
/// ```
/// use murmur_agent::{CircuitBreaker, CircuitState};
/// use murmur_core::MurmurError;
///
/// # async fn example() {
/// let cb = CircuitBreaker::with_defaults("generator");
///
/// let result = cb
///     .execute(|| async { Err::<(), _>(MurmurError::Generation("503".into())) })
///     .await;
/// assert!(result.is_err());
/// assert_eq!(cb.failure_count(), 1);
/// assert_eq!(cb.state(), CircuitState::Closed);
/// # }
/// ```
pub struct CircuitBreaker {
    name: String,
    config: CircuitConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    ///
    /// # Arguments
    ///
    /// * `name` - Label used in logs and in the open-circuit error
    /// * `config` - Failure threshold, open timeout, and half-open probe budget
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        let name = name.into();
        info!(
            breaker = %name,
            "Circuit breaker initialized: threshold={}, timeout={}s",
            config.failure_threshold,
            config.timeout.as_secs()
        );
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                phase: Phase::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Create a breaker with conservative defaults: 5 failures, 60 second timeout, 1 probe
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Get current circuit state
    ///
    /// An open circuit whose timeout has elapsed reports `HalfOpen`; no probe is consumed.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.phase.tag()
    }

    /// Get current failure count (for monitoring)
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Time until an open circuit admits a probe, zero if not open
    pub fn time_until_retry(&self) -> Duration {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        match inner.phase {
            Phase::Open { opened_at } => self.remaining_cooldown(opened_at, now),
            Phase::Closed | Phase::HalfOpen { .. } => Duration::ZERO,
        }
    }

    /// Force the circuit closed and zero all counters
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.phase = Phase::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        info!(breaker = %self.name, "Circuit breaker manually reset");
    }

    /// Run `operation` under circuit breaker protection
    ///
    /// # Errors
    ///
    /// - [`MurmurError::CircuitOpen`] when the call is rejected; the operation is not invoked
    /// - Whatever error the operation itself returned, after it has been recorded
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let admission = self.admit()?;
        let result = operation().await;

        match &result {
            Ok(_) => self.record_success(admission),
            Err(e) => self.record_failure(admission, e),
        }

        result
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remaining_cooldown(&self, opened_at: Instant, now: Instant) -> Duration {
        self.config
            .timeout
            .saturating_sub(now.saturating_duration_since(opened_at))
    }

    /// Move Open to HalfOpen once the cooldown has strictly elapsed
    fn refresh(&self, inner: &mut Inner, now: Instant) {
        if let Phase::Open { opened_at } = inner.phase {
            if now.saturating_duration_since(opened_at) > self.config.timeout {
                info!(breaker = %self.name, "Circuit breaker: moving to HALF_OPEN");
                inner.phase = Phase::HalfOpen { probes_issued: 0 };
            }
        }
    }

    fn admit(&self) -> Result<Admission> {
        let now = Instant::now();
        let mut inner = self.lock();
        self.refresh(&mut inner, now);

        match &mut inner.phase {
            Phase::Closed => Ok(Admission::Normal),
            Phase::Open { opened_at } => {
                let retry_after = self.remaining_cooldown(*opened_at, now);
                Err(MurmurError::CircuitOpen {
                    breaker: self.name.clone(),
                    retry_after,
                })
            }
            Phase::HalfOpen { probes_issued } => {
                if *probes_issued >= self.config.half_open_max_calls {
                    warn!(breaker = %self.name, "Circuit breaker: half-open probe limit reached");
                    return Err(MurmurError::CircuitOpen {
                        breaker: self.name.clone(),
                        retry_after: Duration::ZERO,
                    });
                }
                *probes_issued += 1;
                Ok(Admission::Probe)
            }
        }
    }

    fn record_success(&self, admission: Admission) {
        let mut inner = self.lock();
        match (inner.phase, admission) {
            (Phase::HalfOpen { .. }, Admission::Probe) => {
                info!(breaker = %self.name, "Circuit breaker: service recovered, moving to CLOSED");
                inner.phase = Phase::Closed;
                inner.failure_count = 0;
            }
            (Phase::Closed, _) => inner.failure_count = 0,
            // A call admitted before the circuit opened says nothing about recovery
            _ => {}
        }
    }

    fn record_failure(&self, admission: Admission, error: &MurmurError) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(now);

        warn!(
            breaker = %self.name,
            "Circuit breaker: failure {}/{} - {}",
            inner.failure_count,
            self.config.failure_threshold,
            error
        );

        match (inner.phase, admission) {
            (Phase::Closed, _) if inner.failure_count >= self.config.failure_threshold => {
                error!(
                    breaker = %self.name,
                    "Circuit breaker: threshold exceeded, opening circuit. Will retry after {}s",
                    self.config.timeout.as_secs()
                );
                inner.phase = Phase::Open { opened_at: now };
            }
            (Phase::HalfOpen { .. }, Admission::Probe) => {
                warn!(breaker = %self.name, "Circuit breaker: probe failed, reopening circuit");
                inner.phase = Phase::Open { opened_at: now };
            }
            _ => {}
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::with_defaults("default")
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
