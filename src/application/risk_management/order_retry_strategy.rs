//! Exponential backoff retry policy for exchange order submission
//! (spec §B.3: base 0.5s, cap 8s, max 5 attempts; no retry on permanent
//! errors).

use std::time::Duration;

use crate::domain::errors::ExecutionError;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            max_attempts: 5,
        }
    }
}

#[derive(Clone, Copy)]
pub struct OrderRetryStrategy {
    config: RetryConfig,
}

impl OrderRetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// `None` means "give up": either the error is permanent, or
    /// `attempt` has exhausted `max_attempts`.
    pub fn next_delay(&self, attempt: u32, error: &ExecutionError) -> Option<Duration> {
        if !error.is_retryable() {
            return None;
        }
        if attempt >= self.config.max_attempts {
            return None;
        }
        let scaled = self.config.base_delay.saturating_mul(1 << attempt.min(8));
        Some(scaled.min(self.config.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_errors_never_retry() {
        let strategy = OrderRetryStrategy::new(RetryConfig::default());
        let err = ExecutionError::Permanent("invalid symbol".into());
        assert!(strategy.next_delay(0, &err).is_none());
    }

    #[test]
    fn delay_doubles_and_caps() {
        let strategy = OrderRetryStrategy::new(RetryConfig::default());
        let err = ExecutionError::Transient("timeout".into());
        assert_eq!(strategy.next_delay(0, &err), Some(Duration::from_millis(500)));
        assert_eq!(strategy.next_delay(1, &err), Some(Duration::from_millis(1000)));
        assert_eq!(strategy.next_delay(4, &err), Some(Duration::from_secs(8)));
    }

    #[test]
    fn exhausted_attempts_give_up() {
        let strategy = OrderRetryStrategy::new(RetryConfig::default());
        let err = ExecutionError::RateLimit("429".into());
        assert!(strategy.next_delay(5, &err).is_none());
    }
}
