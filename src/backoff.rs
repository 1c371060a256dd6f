//! Backoff strategies for the retry driver (spec §4.2).

use std::time::Duration;

/// Backoff strategy for retries.
#[derive(Debug, Clone)]
pub enum Backoff {
    /// Fixed delay between retries.
    Constant { delay: Duration },
    /// Linearly increasing delay.
    Linear { base: Duration },
    /// `delay = min(base * factor^(attempt-1), max)`.
    Exponential { base: Duration, factor: f64, max: Option<Duration> },
}

impl Backoff {
    pub fn constant(delay: Duration) -> Self {
        Backoff::Constant { delay }
    }

    pub fn linear(base: Duration) -> Self {
        Backoff::Linear { base }
    }

    /// Exponential backoff with the default doubling factor (`2.0`) and no cap.
    pub fn exponential(base: Duration) -> Self {
        Backoff::Exponential { base, factor: 2.0, max: None }
    }

    /// Exponential backoff with an explicit growth factor, as configured by
    /// the orchestrator's `{initialDelay, maxDelay, factor}` retry config.
    pub fn exponential_with_factor(base: Duration, factor: f64) -> Self {
        Backoff::Exponential { base, factor, max: None }
    }

    /// Set a maximum delay for exponential backoff.
    pub fn with_max(mut self, max: Duration) -> Self {
        if let Backoff::Exponential { max: ref mut m, .. } = self {
            *m = Some(max);
        }
        self
    }

    /// Calculate the delay for a given attempt number (1-indexed).
    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            Backoff::Constant { delay } => *delay,
            Backoff::Linear { base } => {
                base.checked_mul(attempt as u32).unwrap_or(Duration::from_secs(u64::MAX))
            }
            Backoff::Exponential { base, factor, max } => {
                let exponent = attempt.saturating_sub(1) as i32;
                let multiplier = factor.max(1.0).powi(exponent);
                let base_millis = base.as_secs_f64() * 1000.0;
                let delay_millis = base_millis * multiplier;

                let exp_delay = if delay_millis.is_finite() && delay_millis >= 0.0 {
                    Duration::from_secs_f64((delay_millis / 1000.0).min(u64::MAX as f64))
                } else {
                    Duration::from_secs(u64::MAX)
                };

                match max {
                    Some(max) => exp_delay.min(*max),
                    None => exp_delay,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_backoff_returns_same_delay() {
        let backoff = Backoff::constant(Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(1));
        assert_eq!(backoff.delay(100), Duration::from_secs(1));
    }

    #[test]
    fn linear_backoff_increases_linearly() {
        let backoff = Backoff::linear(Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(300));
        assert_eq!(backoff.delay(10), Duration::from_millis(1000));
    }

    #[test]
    fn exponential_backoff_doubles_each_time() {
        let backoff = Backoff::exponential(Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_millis(800));
    }

    #[test]
    fn exponential_backoff_respects_custom_factor() {
        // Matches the orchestrator's default retry config: initialDelay=100ms, factor=2.
        let backoff = Backoff::exponential_with_factor(Duration::from_millis(100), 2.0)
            .with_max(Duration::from_millis(5000));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
    }

    #[test]
    fn exponential_backoff_respects_max() {
        let backoff = Backoff::exponential(Duration::from_millis(100)).with_max(Duration::from_secs(1));

        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(5), Duration::from_secs(1));
        assert_eq!(backoff.delay(10), Duration::from_secs(1));
    }

    #[test]
    fn linear_backoff_handles_overflow() {
        let backoff = Backoff::linear(Duration::from_secs(u64::MAX / 2));
        let delay = backoff.delay(10);
        assert!(delay >= Duration::from_secs(u64::MAX / 2));
    }

    #[test]
    fn exponential_backoff_handles_overflow_without_panicking() {
        let backoff = Backoff::exponential(Duration::from_secs(1));
        let delay = backoff.delay(2000);
        assert!(delay >= Duration::from_secs(1));
    }
}
