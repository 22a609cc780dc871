//! Retry policy for transient request failures.
//!
//! The policy is a pure decision function over 1-based attempt numbers: given
//! the outcome of an attempt, it answers "retry after a delay" or "stop". The
//! orchestrator owns the loop and the waiting; nothing here sleeps.
//!
//! # Backoff semantics
//!
//! The `backoff` flag scales the delay **linearly** by attempt number
//! (`base_delay * attempt`), not exponentially. This is the documented,
//! compatibility-critical behavior of the policy — do not change it to
//! exponential growth.

use std::collections::HashSet;
use std::time::Duration;

/// HTTP statuses retried by default: request timeout, rate limiting, and the
/// transient 5xx family.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Retry configuration.
///
/// # Default Values
///
/// - `attempts`: 3 (total attempts, not retries after the first)
/// - `base_delay`: 1000ms
/// - `backoff`: true (linear scaling by attempt number)
/// - `retryable_statuses`: 408, 429, 500, 502, 503, 504
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts; always at least 1.
    pub attempts: u32,
    /// Base delay between attempts.
    pub base_delay: Duration,
    /// When true, the delay after attempt `n` is `base_delay * n` (linear).
    pub backoff: bool,
    /// Statuses for which a non-ok response is retried.
    pub retryable_statuses: HashSet<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(1000),
            backoff: true,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
        }
    }
}

/// Outcome of a single attempt, as seen by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The transport failed at the network level (no HTTP response).
    TransportError,
    /// An HTTP response arrived with this status.
    Status(u16),
}

/// Policy decision for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again.
    RetryAfter(Duration),
    /// Give up; the current outcome is final.
    Stop,
}

impl RetryConfig {
    /// Create a policy builder.
    #[must_use]
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder {
            config: Self::default(),
        }
    }

    /// Decide whether attempt number `attempt` (1-based) should be followed
    /// by another attempt.
    ///
    /// Transport errors are always retried while attempts remain. HTTP
    /// responses are retried only when their status is in
    /// [`retryable_statuses`](Self::retryable_statuses). The last attempt
    /// never waits; its outcome stands.
    #[must_use]
    pub fn decide(&self, attempt: u32, outcome: AttemptOutcome) -> RetryDecision {
        if attempt >= self.attempts.max(1) {
            return RetryDecision::Stop;
        }
        let retry = match outcome {
            AttemptOutcome::TransportError => true,
            AttemptOutcome::Status(status) => self.retryable_statuses.contains(&status),
        };
        if retry {
            RetryDecision::RetryAfter(self.delay_for_attempt(attempt))
        } else {
            RetryDecision::Stop
        }
    }

    /// Delay after the given 1-based attempt: `base_delay * attempt` with
    /// backoff enabled, plain `base_delay` otherwise.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.backoff {
            self.base_delay.saturating_mul(attempt.max(1))
        } else {
            self.base_delay
        }
    }
}

/// Builder for [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Set the total attempt count; values below 1 are clamped to 1.
    #[must_use]
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.config.attempts = attempts.max(1);
        self
    }

    /// Set the base delay between attempts.
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    /// Enable or disable linear backoff scaling.
    #[must_use]
    pub fn backoff(mut self, backoff: bool) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Replace the retryable status set.
    #[must_use]
    pub fn retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.config.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Build the [`RetryConfig`].
    #[must_use]
    pub fn build(self) -> RetryConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_linear_not_exponential() {
        let config = RetryConfig::builder()
            .base_delay(Duration::from_millis(100))
            .backoff(true)
            .build();

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(300));
    }

    #[test]
    fn test_flat_delay_without_backoff() {
        let config = RetryConfig::builder()
            .base_delay(Duration::from_millis(100))
            .backoff(false)
            .build();

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(100));
    }

    #[test]
    fn test_transport_error_retries_until_last_attempt() {
        let config = RetryConfig::default();
        assert_eq!(
            config.decide(1, AttemptOutcome::TransportError),
            RetryDecision::RetryAfter(Duration::from_millis(1000))
        );
        assert_eq!(
            config.decide(2, AttemptOutcome::TransportError),
            RetryDecision::RetryAfter(Duration::from_millis(2000))
        );
        assert_eq!(
            config.decide(3, AttemptOutcome::TransportError),
            RetryDecision::Stop
        );
    }

    #[test]
    fn test_retryable_status_retries() {
        let config = RetryConfig::default();
        assert_eq!(
            config.decide(1, AttemptOutcome::Status(503)),
            RetryDecision::RetryAfter(Duration::from_millis(1000))
        );
    }

    #[test]
    fn test_non_retryable_status_stops_immediately() {
        let config = RetryConfig::default();
        assert_eq!(config.decide(1, AttemptOutcome::Status(404)), RetryDecision::Stop);
        assert_eq!(config.decide(1, AttemptOutcome::Status(200)), RetryDecision::Stop);
    }

    #[test]
    fn test_attempts_clamped_to_at_least_one() {
        let config = RetryConfig::builder().attempts(0).build();
        assert_eq!(config.attempts, 1);
        assert_eq!(
            config.decide(1, AttemptOutcome::TransportError),
            RetryDecision::Stop
        );
    }

    #[test]
    fn test_default_retryable_set() {
        let config = RetryConfig::default();
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(config.retryable_statuses.contains(&status));
        }
        assert!(!config.retryable_statuses.contains(&404));
    }
}
