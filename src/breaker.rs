//! Circuit breaker (spec §4.3): per-provider closed/open/half-open gate with
//! a rolling error-rate threshold, lock-free like the teacher's breaker.

use crate::clock::{Clock, MonotonicClock};
use crate::retry::Retryable;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// `{errorThresholdPercentage, resetTimeout, timeout}` from spec §4.3, plus
/// the minimum sample size the rolling window needs before it will trip.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub error_threshold_percentage: u8,
    pub min_samples: usize,
    pub reset_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold_percentage: 50,
            min_samples: 10,
            reset_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// The error a wrapped call surfaces through the breaker: either the call's
/// own failure, a per-call timeout, or the breaker's own open-circuit
/// fallback (spec §4.3's `{err, error="Circuit breaker is OPEN"}`).
#[derive(Debug)]
pub enum BreakerError<E> {
    Open,
    Timeout,
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open => write!(f, "Circuit breaker is OPEN"),
            BreakerError::Timeout => write!(f, "call timed out"),
            BreakerError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for BreakerError<E> {}

/// Open is treated as retryable at the orchestrator's discretion (spec §7
/// item 5: a later attempt may land after `resetTimeout` and find the
/// breaker `HalfOpen`); a per-call timeout is not (spec §7 item 6).
impl<E: Retryable> Retryable for BreakerError<E> {
    fn is_retryable(&self) -> bool {
        match self {
            BreakerError::Open => true,
            BreakerError::Timeout => false,
            BreakerError::Inner(e) => e.is_retryable(),
        }
    }
}

struct State {
    state: AtomicU8,
    total: AtomicUsize,
    errors: AtomicUsize,
    opened_at_millis: AtomicU64,
    half_open_in_flight: AtomicU8,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    state: Arc<State>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Arc::new(State {
                state: AtomicU8::new(STATE_CLOSED),
                total: AtomicUsize::new(0),
                errors: AtomicUsize::new(0),
                opened_at_millis: AtomicU64::new(0),
                half_open_in_flight: AtomicU8::new(0),
            }),
            config,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn state(&self) -> CircuitState {
        match self.state.state.load(Ordering::Acquire) {
            STATE_CLOSED => CircuitState::Closed,
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            other => unreachable!("invalid circuit breaker state {}", other),
        }
    }

    pub async fn fire<T, E, Fut, Op>(&self, op: Op) -> Result<T, BreakerError<E>>
    where
        T: Send,
        E: Send,
        Fut: Future<Output = Result<T, E>> + Send,
        Op: FnOnce() -> Fut + Send,
    {
        loop {
            match self.state.state.load(Ordering::Acquire) {
                STATE_OPEN => {
                    let opened_at = self.state.opened_at_millis.load(Ordering::Acquire);
                    let elapsed = self.clock.now_millis().saturating_sub(opened_at);
                    if elapsed < self.config.reset_timeout.as_millis() as u64 {
                        return Err(BreakerError::Open);
                    }
                    match self.state.state.compare_exchange(
                        STATE_OPEN,
                        STATE_HALF_OPEN,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => {
                            self.state.half_open_in_flight.store(1, Ordering::Release);
                            tracing::info!("circuit breaker: open -> half_open");
                            break;
                        }
                        Err(_) => continue,
                    }
                }
                STATE_HALF_OPEN => {
                    if self.state.half_open_in_flight.compare_exchange(
                        0,
                        1,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ).is_err() {
                        return Err(BreakerError::Open);
                    }
                    break;
                }
                _ => break,
            }
        }

        let was_half_open = self.state.state.load(Ordering::Acquire) == STATE_HALF_OPEN;
        let outcome = tokio::time::timeout(self.config.call_timeout, op()).await;

        if was_half_open {
            self.state.half_open_in_flight.store(0, Ordering::Release);
        }

        match outcome {
            Ok(Ok(value)) => {
                self.on_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.on_failure();
                Err(BreakerError::Inner(e))
            }
            Err(_elapsed) => {
                self.on_failure();
                Err(BreakerError::Timeout)
            }
        }
    }

    fn on_success(&self) {
        match self.state.state.load(Ordering::Acquire) {
            STATE_HALF_OPEN => {
                if self
                    .state
                    .state
                    .compare_exchange(STATE_HALF_OPEN, STATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.state.total.store(0, Ordering::Release);
                    self.state.errors.store(0, Ordering::Release);
                    tracing::info!("circuit breaker: half_open -> closed");
                }
            }
            STATE_CLOSED => {
                self.state.total.fetch_add(1, Ordering::AcqRel);
            }
            _ => {}
        }
    }

    fn on_failure(&self) {
        match self.state.state.load(Ordering::Acquire) {
            STATE_HALF_OPEN => {
                if self
                    .state
                    .state
                    .compare_exchange(STATE_HALF_OPEN, STATE_OPEN, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    self.state.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
                    tracing::warn!("circuit breaker: half_open probe failed -> open");
                }
            }
            STATE_CLOSED => {
                let total = self.state.total.fetch_add(1, Ordering::AcqRel) + 1;
                let errors = self.state.errors.fetch_add(1, Ordering::AcqRel) + 1;
                if total >= self.config.min_samples {
                    let rate = (errors * 100) / total;
                    if rate as u8 >= self.config.error_threshold_percentage {
                        if self
                            .state
                            .state
                            .compare_exchange(STATE_CLOSED, STATE_OPEN, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                        {
                            self.state.opened_at_millis.store(self.clock.now_millis(), Ordering::Release);
                            tracing::error!(rate, threshold = self.config.error_threshold_percentage, "circuit breaker: closed -> open");
                        }
                    }
                }
            }
            _ => {}
        }
    }
}
