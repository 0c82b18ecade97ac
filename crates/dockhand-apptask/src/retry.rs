// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded retry helpers.
//!
//! Every flaky external call gets a fixed attempt budget and a fixed
//! interval. Exhausting the budget returns the last error unchanged; there is
//! no unbounded waiting anywhere in a task run.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Attempt budget for one retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub attempts: u32,
    /// Pause between attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    /// Create a policy.
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Policy that retries without pausing.
    pub const fn immediate(attempts: u32) -> Self {
        Self::new(attempts, Duration::ZERO)
    }

    /// Single attempt, no retries.
    pub const fn once() -> Self {
        Self::immediate(1)
    }
}

/// Retry budgets used by the pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicies {
    /// App icon download.
    pub icon_download: RetryPolicy,
    /// DNS record registration.
    pub dns_register: RetryPolicy,
    /// DNS record removal.
    pub dns_unregister: RetryPolicy,
    /// Container image download.
    pub image_download: RetryPolicy,
    /// Waiting for DNS to resolve to the platform address.
    pub dns_propagation: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            icon_download: RetryPolicy::new(10, Duration::from_secs(5)),
            dns_register: RetryPolicy::new(200, Duration::from_secs(5)),
            dns_unregister: RetryPolicy::new(30, Duration::from_secs(5)),
            image_download: RetryPolicy::new(10, Duration::from_secs(15)),
            dns_propagation: RetryPolicy::new(240, Duration::from_secs(5)),
        }
    }
}

impl RetryPolicies {
    /// Same attempt budgets without pauses.
    pub fn immediate() -> Self {
        let d = Self::default();
        Self {
            icon_download: RetryPolicy::immediate(d.icon_download.attempts),
            dns_register: RetryPolicy::immediate(d.dns_register.attempts),
            dns_unregister: RetryPolicy::immediate(d.dns_unregister.attempts),
            image_download: RetryPolicy::immediate(d.image_download.attempts),
            dns_propagation: RetryPolicy::immediate(d.dns_propagation.attempts),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// budget runs out. `op` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut, P>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && is_retryable(&e) => {
                warn!(
                    operation,
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(policy.interval).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Busy,
        Broken,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    fn retryable(e: &TestError) -> bool {
        *e == TestError::Busy
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let result = retry(
            RetryPolicy::new(5, Duration::from_secs(5)),
            "test",
            |_| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TestError::Busy)
                    } else {
                        Ok("done")
                    }
                }
            },
            retryable,
        )
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = retry(
            RetryPolicy::new(5, Duration::from_secs(5)),
            "test",
            |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Broken)
                }
            },
            retryable,
        )
        .await;

        assert_eq!(result, Err(TestError::Broken));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let mut seen = Vec::new();

        let result: Result<(), _> = retry(
            RetryPolicy::new(3, Duration::from_secs(1)),
            "test",
            |attempt| {
                seen.push(attempt);
                async { Err(TestError::Busy) }
            },
            retryable,
        )
        .await;

        assert_eq!(result, Err(TestError::Busy));
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_default_budgets() {
        let p = RetryPolicies::default();
        assert_eq!(p.dns_register.attempts, 200);
        assert_eq!(p.dns_propagation.attempts, 240);
        assert_eq!(p.image_download.interval, Duration::from_secs(15));
        assert_eq!(RetryPolicies::immediate().icon_download.interval, Duration::ZERO);
    }
}
