//! Circuit Breaker for Upstream Routes
//!
//! Implements a state machine-based circuit breaker so that a failing
//! backend service is not hammered by every incoming request. While the
//! circuit is open the gateway answers with a fallback 503 immediately.
//!
//! # State Machine
//!
//! ```text
//! CLOSED (normal operation)
//!   ↓ (failure_threshold consecutive failures)
//! OPEN (requests rejected with the fallback response)
//!   ↓ (after recovery_timeout_seconds)
//! HALF-OPEN (trial mode, admits half_open_max_calls requests)
//!   ↓ (success) → CLOSED
//!   ↓ (failure) → OPEN
//! ```
//!
//! A transport error or a 5xx response from the upstream counts as a failure.
//!
//! # Thread Safety
//!
//! Uses `Arc<RwLock<CircuitBreakerState>>` for concurrent access from all
//! actix workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all requests forwarded
    Closed,
    /// Upstream considered down - requests rejected immediately
    Open,
    /// Recovery test mode - allows limited requests through
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "Closed"),
            CircuitState::Open => write!(f, "Open"),
            CircuitState::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Circuit breaker configuration (per-route)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Time to wait before attempting recovery (seconds)
    #[serde(default = "default_recovery_timeout")]
    pub recovery_timeout_seconds: u64,
    /// Maximum calls allowed in half-open state
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> u64 {
    30
}

fn default_half_open_max_calls() -> u32 {
    1
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_seconds: default_recovery_timeout(),
            half_open_max_calls: default_half_open_max_calls(),
        }
    }
}

/// Circuit breaker state (per-route)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    /// Current circuit state
    pub state: CircuitState,
    /// Consecutive failure count
    pub failure_count: u32,
    /// Timestamp of last failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Timestamp when circuit was opened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opened_at: Option<DateTime<Utc>>,
    /// Number of calls admitted in half-open state
    pub half_open_calls: u32,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            opened_at: None,
            half_open_calls: 0,
        }
    }
}

/// Circuit breaker guarding one upstream route
pub struct CircuitBreaker {
    /// Route ID this circuit breaker protects
    route_id: String,
    /// Circuit breaker configuration
    config: CircuitBreakerConfig,
    /// Current circuit breaker state (thread-safe)
    state: Arc<RwLock<CircuitBreakerState>>,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker for a route
    pub fn new(route_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            route_id: route_id.into(),
            config,
            state: Arc::new(RwLock::new(CircuitBreakerState::default())),
        }
    }

    /// Ask to call the upstream (fail-fast if Open)
    ///
    /// # State Transitions
    ///
    /// - **Closed**: Always allow
    /// - **Open**: Check if recovery timeout passed → Half-Open, otherwise deny
    /// - **Half-Open**: Allow if half_open_calls < half_open_max_calls
    ///
    /// The returned [`CallPermit`] must be settled with the outcome. A permit
    /// dropped unsettled hands its half-open trial slot back.
    pub async fn try_acquire(self: &Arc<Self>) -> Option<CallPermit> {
        let mut state = self.state.write().await;

        if state.state == CircuitState::Open {
            if !self.should_attempt_reset(&state) {
                debug!(
                    route_id = %self.route_id,
                    "Circuit breaker OPEN - rejecting call"
                );
                return None;
            }

            warn!(
                route_id = %self.route_id,
                from = %CircuitState::Open,
                to = %CircuitState::HalfOpen,
                "Circuit breaker state transition (recovery timeout passed)"
            );
            state.state = CircuitState::HalfOpen;
            state.half_open_calls = 0;
        }

        match state.state {
            CircuitState::HalfOpen => {
                if state.half_open_calls >= self.config.half_open_max_calls {
                    debug!(
                        route_id = %self.route_id,
                        "Circuit breaker Half-Open - trial budget used, rejecting call"
                    );
                    return None;
                }

                state.half_open_calls += 1;
                debug!(
                    route_id = %self.route_id,
                    half_open_calls = state.half_open_calls,
                    max_calls = self.config.half_open_max_calls,
                    "Circuit breaker Half-Open - allowing trial call"
                );
                Some(CallPermit::new(self.clone(), true, state.opened_at))
            }
            _ => Some(CallPermit::new(self.clone(), false, None)),
        }
    }

    /// Record a successful upstream exchange
    ///
    /// - **Closed**: Reset failure_count to 0
    /// - **Half-Open**: Transition to Closed, reset counters
    /// - **Open**: Ignored (a request admitted before the circuit opened)
    async fn record_success(&self) {
        let mut state = self.state.write().await;

        match state.state {
            CircuitState::Closed => {
                if state.failure_count > 0 {
                    debug!(
                        route_id = %self.route_id,
                        previous_failures = state.failure_count,
                        "Resetting failure count after success"
                    );
                    state.failure_count = 0;
                    state.last_failure_time = None;
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    route_id = %self.route_id,
                    from = %CircuitState::HalfOpen,
                    to = %CircuitState::Closed,
                    "Circuit breaker state transition (recovery successful)"
                );

                *state = CircuitBreakerState::default();
            }
            CircuitState::Open => {
                debug!(
                    route_id = %self.route_id,
                    "Received success in Open state (in-flight request)"
                );
            }
        }
    }

    /// Record a failed upstream exchange
    ///
    /// - **Closed**: Increment failure_count, if >= threshold → Open
    /// - **Half-Open**: Transition back to Open
    /// - **Open**: Only the failure timestamp is updated
    async fn record_failure(&self) {
        let mut state = self.state.write().await;
        let now = Utc::now();
        state.last_failure_time = Some(now);

        match state.state {
            CircuitState::Closed => {
                state.failure_count += 1;

                debug!(
                    route_id = %self.route_id,
                    failure_count = state.failure_count,
                    threshold = self.config.failure_threshold,
                    "Recorded failure in Closed state"
                );

                if state.failure_count >= self.config.failure_threshold {
                    warn!(
                        route_id = %self.route_id,
                        from = %CircuitState::Closed,
                        to = %CircuitState::Open,
                        failure_count = state.failure_count,
                        "Circuit breaker state transition (failure threshold reached)"
                    );

                    state.state = CircuitState::Open;
                    state.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    route_id = %self.route_id,
                    from = %CircuitState::HalfOpen,
                    to = %CircuitState::Open,
                    "Circuit breaker state transition (recovery failed)"
                );

                state.state = CircuitState::Open;
                state.opened_at = Some(now);
                state.half_open_calls = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Get current state (for health and metrics)
    pub async fn get_state(&self) -> CircuitState {
        self.state.read().await.state
    }

    /// Give back a half-open trial slot whose call never completed
    ///
    /// Only applies while the circuit is still in the half-open round that
    /// admitted the call (same `opened_at`).
    fn release_trial(&self, state: &mut CircuitBreakerState, opened_at: Option<DateTime<Utc>>) {
        if state.state == CircuitState::HalfOpen
            && state.opened_at == opened_at
            && state.half_open_calls > 0
        {
            state.half_open_calls -= 1;
            debug!(
                route_id = %self.route_id,
                half_open_calls = state.half_open_calls,
                "Released unfinished half-open trial call"
            );
        }
    }

    /// Check if should transition from Open to Half-Open
    fn should_attempt_reset(&self, state: &CircuitBreakerState) -> bool {
        match state.opened_at {
            Some(opened_at) => {
                let elapsed = Utc::now().signed_duration_since(opened_at);
                let timeout =
                    chrono::Duration::seconds(self.config.recovery_timeout_seconds as i64);
                elapsed >= timeout
            }
            None => {
                warn!(
                    route_id = %self.route_id,
                    "Open state missing opened_at timestamp"
                );
                true
            }
        }
    }
}

/// Admission to call an upstream, obtained from [`CircuitBreaker::try_acquire`]
///
/// Settle it with [`CallPermit::success`] or [`CallPermit::failure`]. A
/// half-open trial permit that is dropped unsettled (the request bailed out
/// or the client went away) returns its slot so the next request can probe
/// the upstream.
#[must_use = "settle the permit with the upstream outcome"]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    /// `opened_at` of the half-open round this trial belongs to
    trial_of: Option<DateTime<Utc>>,
    trial: bool,
    settled: bool,
}

impl CallPermit {
    fn new(breaker: Arc<CircuitBreaker>, trial: bool, trial_of: Option<DateTime<Utc>>) -> Self {
        Self {
            breaker,
            trial_of,
            trial,
            settled: false,
        }
    }

    pub async fn success(mut self) {
        self.settled = true;
        self.breaker.record_success().await;
    }

    pub async fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure().await;
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if self.settled || !self.trial {
            return;
        }

        if let Ok(mut state) = self.breaker.state.try_write() {
            self.breaker.release_trial(&mut state, self.trial_of);
            return;
        }

        // Lock is busy; release from a task instead of blocking the worker
        let breaker = self.breaker.clone();
        let trial_of = self.trial_of;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let mut state = breaker.state.write().await;
                breaker.release_trial(&mut state, trial_of);
            });
        }
    }
}
