use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation — calls flow through.
    Closed,
    /// Dependency is failing — calls are rejected immediately.
    Open,
    /// Recovery probe — a single call is allowed to test dependency health.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

fn decode_state(raw: u8) -> CircuitState {
    match raw {
        STATE_OPEN => CircuitState::Open,
        STATE_HALF_OPEN => CircuitState::HalfOpen,
        _ => CircuitState::Closed,
    }
}

/// Returned when a call is rejected because the circuit is open. Callers map
/// this to their own `Unavailable` kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("circuit open for dependency '{0}'")]
pub struct CircuitOpen(pub String);

/// Configuration for a per-dependency circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a probe.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Circuit breaker for a single external dependency.
///
/// All state lives in atomics so the hot path takes no locks: the failure
/// counter is a fetch-add, state transitions are compare-and-swap, and the
/// half-open probe slot is a CAS on a flag. Exactly one caller wins the probe
/// after the cool-down; everyone else keeps failing fast until the probe
/// resolves.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    opened_at_ms: AtomicI64,
    probe_in_flight: AtomicBool,
}

impl CircuitBreaker {
    /// Create a closed breaker for the named dependency.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: AtomicU8::new(STATE_CLOSED),
            consecutive_failures: AtomicU32::new(0),
            opened_at_ms: AtomicI64::new(0),
            probe_in_flight: AtomicBool::new(false),
        }
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Acquire permission to call the dependency.
    ///
    /// `Err(CircuitOpen)` returns without performing any I/O. When the
    /// cool-down has elapsed, the first caller transitions the breaker to
    /// half-open and becomes the probe; the caller must follow up with
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn try_acquire(&self) -> Result<(), CircuitOpen> {
        match decode_state(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let opened_at = self.opened_at_ms.load(Ordering::Acquire);
                #[allow(clippy::cast_possible_truncation)]
                let cooldown_ms = self.config.cooldown.as_millis() as i64;
                if Self::now_ms() - opened_at < cooldown_ms {
                    return Err(CircuitOpen(self.name.clone()));
                }
                // Cool-down elapsed: one caller wins the open -> half-open
                // transition and takes the probe slot.
                if self
                    .state
                    .compare_exchange(
                        STATE_OPEN,
                        STATE_HALF_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    debug!(dependency = %self.name, "circuit transitioning open -> half-open");
                    self.probe_in_flight.store(true, Ordering::Release);
                    return Ok(());
                }
                self.try_acquire_probe()
            }
            CircuitState::HalfOpen => self.try_acquire_probe(),
        }
    }

    fn try_acquire_probe(&self) -> Result<(), CircuitOpen> {
        if self
            .probe_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            && decode_state(self.state.load(Ordering::Acquire)) == CircuitState::HalfOpen
        {
            return Ok(());
        }
        Err(CircuitOpen(self.name.clone()))
    }

    /// Record a successful call. Closes a half-open circuit.
    pub fn record_success(&self) {
        match decode_state(self.state.load(Ordering::Acquire)) {
            CircuitState::HalfOpen => {
                info!(dependency = %self.name, "circuit closing after successful probe");
                self.consecutive_failures.store(0, Ordering::Release);
                self.state.store(STATE_CLOSED, Ordering::Release);
                self.probe_in_flight.store(false, Ordering::Release);
            }
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Release);
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed call. Opens the circuit at the failure threshold, and
    /// re-opens immediately on a failed half-open probe.
    pub fn record_failure(&self) {
        match decode_state(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold
                    && self
                        .state
                        .compare_exchange(
                            STATE_CLOSED,
                            STATE_OPEN,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    info!(
                        dependency = %self.name,
                        failures,
                        threshold = self.config.failure_threshold,
                        "circuit opening"
                    );
                    self.opened_at_ms.store(Self::now_ms(), Ordering::Release);
                }
            }
            CircuitState::HalfOpen => {
                info!(dependency = %self.name, "circuit re-opening after failed probe");
                self.opened_at_ms.store(Self::now_ms(), Ordering::Release);
                self.state.store(STATE_OPEN, Ordering::Release);
                self.probe_in_flight.store(false, Ordering::Release);
            }
            CircuitState::Open => {}
        }
    }

    /// Current state without triggering transitions.
    pub fn state(&self) -> CircuitState {
        decode_state(self.state.load(Ordering::Acquire))
    }

    /// Dependency name this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration in effect.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Force the breaker back to closed.
    pub fn reset(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);
        self.state.store(STATE_CLOSED, Ordering::Release);
    }
}

/// Immutable table of circuit breakers, one per external dependency.
///
/// Built once at startup; lookups afterwards are lock-free map reads. The
/// breakers themselves handle their own interior mutability through atomics.
#[derive(Debug, Default)]
pub struct BreakerSet {
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a breaker for a dependency. Construction-time only.
    pub fn register(&mut self, name: impl Into<String>, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let name = name.into();
        let breaker = Arc::new(CircuitBreaker::new(name.clone(), config));
        self.breakers.insert(name, Arc::clone(&breaker));
        breaker
    }

    /// Look up the breaker for a dependency.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(Arc::clone)
    }

    /// Current state of every breaker, sorted by dependency name.
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        let mut states: Vec<(String, CircuitState)> = self
            .breakers
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }
}
