// Copyright 2025 Billchat Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Retry/backoff primitives for idempotent remote reads.
//!
//! The wrapper is composable around any single-shot operation; it only
//! knows whether an error is transient (via [`Retryable`]) and how long
//! to wait between attempts. The delay schedule is pure given
//! `(attempt, initial_delay, max_delay, multiplier)` — no jitter — so
//! tests can assert exact scheduling.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Immutable retry configuration.
///
/// Invariants: `max_delay >= initial_delay`, `multiplier >= 1.0`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = single attempt).
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // 1s, 2s, 4s — well under a 30s request budget.
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(32_000),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based):
    /// `min(initial_delay * multiplier^attempt, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let clamped = base.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(clamped)
    }

    /// Total delay incurred by `retries` consecutive retries.
    pub fn total_delay(&self, retries: u32) -> Duration {
        (0..retries).map(|i| self.delay_for_attempt(i)).sum()
    }
}

/// Errors that can distinguish transient failures from permanent ones.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Terminal outcome of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// A non-retryable error: propagated immediately, zero delay.
    #[error("operation failed: {0}")]
    Permanent(#[source] E),

    /// The retry budget ran out; carries the last transient error.
    #[error("retry budget exhausted after {attempts} attempts: {last_error}")]
    Exhausted {
        attempts: u32,
        #[source]
        last_error: E,
    },
}

impl<E> RetryError<E> {
    /// The underlying error, whichever way the retry loop ended.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Permanent(e) => e,
            RetryError::Exhausted { last_error, .. } => last_error,
        }
    }
}

/// Run `operation` under `policy`, retrying transient failures.
///
/// Retryable errors are retried up to `policy.max_retries` times with
/// the exponential schedule; the last error is raised once the budget
/// is exhausted. Non-retryable errors propagate on the first failure.
pub async fn retry_with_policy<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(RetryError::Permanent(e)),
            Err(e) if attempt >= policy.max_retries => {
                return Err(RetryError::Exhausted {
                    attempts: attempt + 1,
                    last_error: e,
                });
            }
            Err(e) => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    error = %e,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Error)]
    enum TestError {
        #[error("transient")]
        Transient,
        #[error("fatal")]
        Fatal,
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn instant_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_schedule_is_pure_and_exponential() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4000));
        // Identical inputs, identical output
        assert_eq!(policy.delay_for_attempt(2), policy.delay_for_attempt(2));
    }

    #[test]
    fn test_delay_clamps_at_max() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(32_000),
            multiplier: 2.0,
        };

        // 2^6 = 64s would exceed the cap
        assert_eq!(policy.delay_for_attempt(6), Duration::from_millis(32_000));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_millis(32_000));
    }

    #[test]
    fn test_total_delay_is_schedule_sum() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.total_delay(3), Duration::from_millis(7000));
        assert_eq!(policy.total_delay(0), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result = retry_with_policy(&instant_policy(3), move || {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_propagates_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<u32, _> = retry_with_policy(&instant_policy(3), move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Fatal)
            }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Permanent(TestError::Fatal))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_raises_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<u32, _> = retry_with_policy(&instant_policy(2), move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Transient)
            }
        })
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, last_error }) => {
                assert_eq!(attempts, 3); // initial attempt + 2 retries
                assert!(matches!(last_error, TestError::Transient));
            }
            other => panic!("expected exhaustion, got {:?}", other.map(|_| ())),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_single_attempt() {
        let result: Result<u32, _> =
            retry_with_policy(&instant_policy(0), || async { Err(TestError::Transient) }).await;

        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 1, .. })
        ));
    }
}
