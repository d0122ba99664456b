use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed invocations that open the circuit
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls
    pub cool_down: Duration,
    /// Consecutive half-open successes needed to close again
    pub half_open_successes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(60),
            half_open_successes: 3,
        }
    }
}

/// Read-only view of one breaker
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub half_open_successes: u32,
    pub retry_after: Option<Duration>,
}

/// Circuit breaker for one operation.
///
/// Not synchronized; the retrier keeps breakers behind its own lock and every
/// method is a short synchronous transition.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    trial_started: Option<Instant>,
    last_failure: Option<Instant>,
    open_until: Option<Instant>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_successes: 0,
            trial_started: None,
            last_failure: None,
            open_until: None,
            config,
        }
    }

    /// Whether a call may go through now. An open circuit whose cool-down has
    /// elapsed moves to half-open and admits a single trial; further calls are
    /// rejected until that trial reports back.
    pub fn can_execute(&mut self) -> bool {
        let now = Instant::now();
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                if self.open_until.is_some_and(|until| now < until) {
                    return false;
                }
                self.state = CircuitState::HalfOpen;
                self.half_open_successes = 0;
                self.trial_started = Some(now);
                true
            }
            CircuitState::HalfOpen => match self.trial_started {
                // a trial that never reported back stops blocking after one cool-down
                Some(started) if now.duration_since(started) < self.config.cool_down => false,
                _ => {
                    self.trial_started = Some(now);
                    true
                }
            },
        }
    }

    /// Returns true when this success closed a half-open circuit
    pub fn record_success(&mut self) -> bool {
        match self.state {
            CircuitState::HalfOpen => {
                self.half_open_successes += 1;
                self.trial_started = None;
                if self.half_open_successes >= self.config.half_open_successes.max(1) {
                    self.close();
                    return true;
                }
                false
            }
            CircuitState::Closed => {
                self.failure_count = 0;
                false
            }
            CircuitState::Open => false,
        }
    }

    /// Returns true when this failure opened the circuit
    pub fn record_failure(&mut self) -> bool {
        let now = Instant::now();
        self.last_failure = Some(now);

        match self.state {
            CircuitState::HalfOpen => {
                self.trip(now);
                true
            }
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.config.failure_threshold.max(1) {
                    self.trip(now);
                    return true;
                }
                false
            }
            CircuitState::Open => {
                self.failure_count += 1;
                false
            }
        }
    }

    fn trip(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.open_until = Some(now + self.config.cool_down);
        self.half_open_successes = 0;
        self.trial_started = None;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.half_open_successes = 0;
        self.trial_started = None;
        self.open_until = None;
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    /// Remaining cool-down of an open circuit
    pub fn retry_after(&self) -> Option<Duration> {
        match self.state {
            CircuitState::Open => self
                .open_until
                .map(|until| until.saturating_duration_since(Instant::now())),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            half_open_successes: self.half_open_successes,
            retry_after: self.retry_after(),
        }
    }

    pub fn reset(&mut self) {
        self.close();
        self.last_failure = None;
    }
}
