//! Sliding-window rate limiting and circuit breaker, grounded on the
//! teacher's `services/rate_limiting.rs` and `services/circuit_breaker.rs`
//! but scoped to a single process (spec §4.4/§5 describe per-tool state,
//! not a cross-process store).

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

const WINDOW: Duration = Duration::from_secs(60);

/// Tracks request timestamps in a 60-second sliding window and enforces a
/// minimum interval floor between consecutive requests (spec §4.4).
pub struct SlidingWindowLimiter {
    requests_per_minute: u32,
    min_request_interval: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
    last_request: Mutex<Option<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(requests_per_minute: u32, min_request_interval: Duration) -> Self {
        Self {
            requests_per_minute,
            min_request_interval,
            timestamps: Mutex::new(VecDeque::new()),
            last_request: Mutex::new(None),
        }
    }

    /// Blocks until a request is allowed to proceed, honoring both the
    /// sliding window cap and the minimum-interval floor.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                let now = Instant::now();
                while let Some(&front) = timestamps.front() {
                    if now.duration_since(front) > WINDOW {
                        timestamps.pop_front();
                    } else {
                        break;
                    }
                }
                if timestamps.len() >= self.requests_per_minute as usize {
                    let oldest = *timestamps.front().expect("len checked above");
                    Some(WINDOW - now.duration_since(oldest))
                } else {
                    None
                }
            };
            if let Some(wait) = wait {
                info!(wait_ms = wait.as_millis() as u64, "rate limit window full, waiting");
                tokio::time::sleep(wait).await;
                continue;
            }
            break;
        }

        let floor_wait = {
            let last_request = self.last_request.lock().await;
            last_request
                .map(|last| {
                    let elapsed = Instant::now().duration_since(last);
                    self.min_request_interval.saturating_sub(elapsed)
                })
                .unwrap_or_default()
        };
        if floor_wait > Duration::ZERO {
            tokio::time::sleep(floor_wait).await;
        }

        let now = Instant::now();
        self.timestamps.lock().await.push_back(now);
        *self.last_request.lock().await = Some(now);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(30),
            half_open_success_threshold: 3,
        }
    }
}

struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
}

/// Closed/Open/HalfOpen state machine per spec §4.4's retry policy and the
/// teacher's `circuit_breaker.rs` shape, downgraded from Prometheus-backed
/// counters to plain internal counters (metrics emission is a named
/// non-goal here).
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
            }),
        }
    }

    /// `true` when a request may proceed: closed, or open-but-timed-out
    /// (transitions to half-open on the way).
    pub async fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= self.config.open_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.half_open_success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!("circuit breaker opening after repeated failures");
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.half_open_successes = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }
}
