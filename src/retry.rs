//! Retry driver (spec §4.2): bounded exponential backoff around any
//! fallible async operation.

use crate::backoff::Backoff;
use crate::jitter::Jitter;
use crate::sleeper::{Sleeper, TokioSleeper};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Implemented by the failure type a retried operation returns, so the
/// driver can tell a transient vendor hiccup from a failure retrying can
/// never fix (spec §4.2's "caller is responsible for... non-retryable
/// results").
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// `{maxAttempts, initialDelay, maxDelay, factor}` from spec §4.2.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            factor: 2.0,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum BuildError {
    InvalidMaxAttempts(usize),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::InvalidMaxAttempts(n) => write!(f, "max_attempts must be > 0 (got {})", n),
        }
    }
}

impl std::error::Error for BuildError {}

/// The final outcome when an operation never succeeds. On the last attempt
/// the original failure is surfaced with the attempt count attached, as
/// spec §4.2 requires; a non-retryable failure short-circuits immediately.
#[derive(Debug)]
pub enum RetryError<E> {
    NonRetryable(E),
    Exhausted { attempts: usize, last: E },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::NonRetryable(e) => write!(f, "{}", e),
            RetryError::Exhausted { attempts, last } => {
                write!(f, "retry exhausted after {} attempts: {}", attempts, last)
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::NonRetryable(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("sleeper", &"<sleeper>")
            .finish()
    }
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Build a policy straight from a `RetryConfig`, validating it the way
    /// the builder does.
    pub fn from_config(config: &RetryConfig) -> Result<Self, BuildError> {
        RetryPolicy::builder()
            .max_attempts(config.max_attempts)?
            .backoff(Backoff::exponential_with_factor(config.initial_delay, config.factor).with_max(config.max_delay))
            .build()
    }

    pub async fn execute<T, E, Fut, Op>(&self, mut operation: Op) -> Result<T, RetryError<E>>
    where
        T: Send,
        E: Retryable + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        Op: FnMut(usize) -> Fut + Send,
    {
        for attempt in 0..self.max_attempts {
            match operation(attempt + 1).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(RetryError::NonRetryable(e));
                    }
                    if attempt + 1 >= self.max_attempts {
                        return Err(RetryError::Exhausted { attempts: self.max_attempts, last: e });
                    }

                    let mut delay = self.backoff.delay(attempt + 1);
                    delay = self.jitter.apply(delay);
                    self.sleeper.sleep(delay).await;
                }
            }
        }

        unreachable!("max_attempts must be > 0; loop always returns before exhausting its range")
    }
}

pub struct RetryPolicyBuilder {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::exponential(Duration::from_millis(100)),
            jitter: Jitter::None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn max_attempts(mut self, attempts: usize) -> Result<Self, BuildError> {
        if attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(attempts));
        }
        self.max_attempts = attempts;
        Ok(self)
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            sleeper: self.sleeper,
        })
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sleeper::{InstantSleeper, TrackingSleeper};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError {
        message: String,
        retryable: bool,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    fn transient(msg: &str) -> TestError {
        TestError { message: msg.to_string(), retryable: true }
    }

    fn fatal(msg: &str) -> TestError {
        TestError { message: msg.to_string(), retryable: false }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_without_sleeping() {
        let policy = RetryPolicy::builder()
            .max_attempts(3)
            .unwrap()
            .backoff(Backoff::constant(Duration::from_millis(100)))
            .with_sleeper(InstantSleeper)
            .build()
            .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let result = policy
            .execute(|_attempt| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, TestError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let policy = RetryPolicy::builder()
            .max_attempts(5)
            .unwrap()
            .backoff(Backoff::constant(Duration::from_millis(10)))
            .with_sleeper(InstantSleeper)
            .build()
            .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let result = policy
            .execute(|attempt| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Err(transient("still warming up"))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_last_error_with_attempt_count_on_exhaustion() {
        let policy = RetryPolicy::builder()
            .max_attempts(3)
            .unwrap()
            .backoff(Backoff::constant(Duration::from_millis(10)))
            .with_sleeper(InstantSleeper)
            .build()
            .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let result = policy
            .execute(|attempt| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(transient(&format!("attempt {}", attempt)))
                }
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        match result.unwrap_err() {
            RetryError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(last.message, "attempt 3");
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_retryable_failure_short_circuits_immediately() {
        let policy = RetryPolicy::builder()
            .max_attempts(5)
            .unwrap()
            .backoff(Backoff::constant(Duration::from_millis(10)))
            .with_sleeper(InstantSleeper)
            .build()
            .unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let result = policy
            .execute(|_attempt| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(fatal("bad request"))
                }
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(matches!(result.unwrap_err(), RetryError::NonRetryable(_)));
    }

    #[tokio::test]
    async fn delay_follows_factor_and_initial_delay() {
        let sleeper = TrackingSleeper::new();
        let policy = RetryPolicy::builder()
            .max_attempts(4)
            .unwrap()
            .backoff(Backoff::exponential_with_factor(Duration::from_millis(100), 2.0))
            .with_jitter(Jitter::None)
            .with_sleeper(sleeper.clone())
            .build()
            .unwrap();

        let _ = policy.execute(|_attempt| async { Err::<(), _>(transient("fail")) }).await;

        assert_eq!(sleeper.calls(), 3);
        assert_eq!(sleeper.call_at(0).unwrap(), Duration::from_millis(100));
        assert_eq!(sleeper.call_at(1).unwrap(), Duration::from_millis(200));
        assert_eq!(sleeper.call_at(2).unwrap(), Duration::from_millis(400));
    }

    #[test]
    fn builder_rejects_zero_max_attempts() {
        let err = RetryPolicy::builder().max_attempts(0).unwrap_err();
        assert_eq!(err, BuildError::InvalidMaxAttempts(0));
    }

    #[test]
    fn from_config_applies_factor_and_caps() {
        let config = RetryConfig {
            max_attempts: 4,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(120),
            factor: 2.0,
        };
        let policy = RetryPolicy::from_config(&config).unwrap();
        assert_eq!(policy.backoff.delay(1), Duration::from_millis(50));
        assert_eq!(policy.backoff.delay(2), Duration::from_millis(100));
        assert_eq!(policy.backoff.delay(3), Duration::from_millis(120));
    }
}
