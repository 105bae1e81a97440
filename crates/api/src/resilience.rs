//! Retry and circuit breaking for outbound HTTP calls.
//!
//! Upstream clients (Shopify, `OpenAI`) wrap each request in
//! [`call_with_resilience`], which consults a per-client [`CircuitBreaker`]
//! and retries transient failures according to a [`RetryPolicy`].
//!
//! Only idempotent calls should use a policy with more than one attempt.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Errors that can tell whether retrying could help.
pub trait RetryableError: Display {
    /// Connection failures, timeouts, rate limits and 5xx responses.
    fn is_transient(&self) -> bool;

    /// Server-provided delay before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// The error to return when the breaker rejects a call.
    fn circuit_open() -> Self;
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy for idempotent reads.
    pub const READS: Self = Self {
        max_attempts: 3,
        base_delay: Duration::from_millis(200),
        max_delay: Duration::from_secs(5),
    };

    /// Policy for writes and other non-idempotent calls.
    pub const SINGLE_ATTEMPT: Self = Self {
        max_attempts: 1,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    };

    /// Delay after the given (1-based) failed attempt.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen { since: Instant },
}

/// Consecutive-failure circuit breaker.
///
/// After `failure_threshold` transient failures in a row the breaker opens
/// and rejects calls for `cooldown`. The first call after the cooldown is a
/// trial: success closes the breaker, failure reopens it.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Default threshold for upstream clients.
    pub const DEFAULT_THRESHOLD: u32 = 5;
    /// Default open period for upstream clients.
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

    /// Create a closed breaker.
    #[must_use]
    pub const fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
        }
    }

    /// Whether a call may proceed now.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { until } if now >= until => {
                *state = BreakerState::HalfOpen { since: now };
                true
            }
            BreakerState::Open { .. } => false,
            // A trial whose caller went away must not wedge the breaker.
            BreakerState::HalfOpen { since } if now.duration_since(since) >= self.cooldown => {
                *state = BreakerState::HalfOpen { since: now };
                true
            }
            BreakerState::HalfOpen { .. } => false,
        }
    }

    /// Record a call that reached a healthy upstream.
    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = BreakerState::Closed { failures: 0 };
    }

    /// Record a transient failure.
    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let open = BreakerState::Open {
            until: Instant::now() + self.cooldown,
        };
        *state = match *state {
            BreakerState::Closed { failures } if failures + 1 < self.failure_threshold => {
                BreakerState::Closed {
                    failures: failures + 1,
                }
            }
            _ => open,
        };
    }

    /// Whether the breaker is currently rejecting calls.
    pub fn is_open(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(*state, BreakerState::Open { until } if Instant::now() < until)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD, Self::DEFAULT_COOLDOWN)
    }
}

/// Run `op` under the breaker, retrying transient failures per `policy`.
///
/// # Errors
///
/// Returns the last error from `op`, or `E::circuit_open()` when the
/// breaker rejects an attempt.
pub async fn call_with_resilience<T, E, F, Fut>(
    policy: RetryPolicy,
    breaker: &CircuitBreaker,
    mut op: F,
) -> Result<T, E>
where
    E: RetryableError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        if !breaker.try_acquire() {
            return Err(E::circuit_open());
        }

        match op().await {
            Ok(value) => {
                breaker.record_success();
                return Ok(value);
            }
            Err(e) if e.is_transient() => {
                breaker.record_failure();
                if attempt >= policy.max_attempts {
                    return Err(e);
                }
                let delay = e
                    .retry_after()
                    .map_or_else(|| policy.backoff(attempt), |d| d.min(policy.max_delay));
                tracing::warn!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Transient upstream failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                // The upstream answered; it is reachable even if it said no.
                breaker.record_success();
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    enum FakeError {
        Transient,
        Permanent,
        Open,
    }

    impl Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl RetryableError for FakeError {
        fn is_transient(&self) -> bool {
            matches!(self, Self::Transient)
        }

        fn circuit_open() -> Self {
            Self::Open
        }
    }

    const FAST: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    };

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let breaker = CircuitBreaker::default();

        let result = call_with_resilience(FAST, &breaker, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(FakeError::Transient)
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!breaker.is_open());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let breaker = CircuitBreaker::default();

        let result: Result<(), _> = call_with_resilience(FAST, &breaker, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FakeError::Transient)
        })
        .await;

        assert_eq!(result.unwrap_err(), FakeError::Transient);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let breaker = CircuitBreaker::default();

        let result: Result<(), _> = call_with_resilience(FAST, &breaker, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(FakeError::Permanent)
        })
        .await;

        assert_eq!(result.unwrap_err(), FakeError::Permanent);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits() {
        let calls = AtomicU32::new(0);
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));

        let _: Result<(), _> = call_with_resilience(FAST, &breaker, || async {
            Err(FakeError::Transient)
        })
        .await;
        assert!(breaker.is_open());

        let result: Result<(), FakeError> = call_with_resilience(FAST, &breaker, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert_eq!(result.unwrap_err(), FakeError::Open);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_half_open_trial_closes_on_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        assert!(!breaker.try_acquire());

        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.try_acquire());
        // Only one trial at a time.
        assert!(!breaker.try_acquire());

        breaker.record_success();
        assert!(breaker.try_acquire());
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_half_open_trial_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.try_acquire());

        breaker.record_failure();
        assert!(breaker.is_open());
        assert!(!breaker.try_acquire());
    }
}
