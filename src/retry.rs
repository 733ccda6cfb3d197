//! Generic retry/timeout harness.
//!
//! Wraps an async operation with a per-attempt wall-clock deadline and a
//! bounded retry budget. Only errors the caller's predicate accepts are
//! retried; everything else propagates on first occurrence. Deadline
//! overruns are surfaced as `CallError::Timeout` and go through the same
//! predicate, so a caller can opt into retrying them.
//!
//! The harness has no domain knowledge — content generation and SMTP
//! transport both run through it with their own policies and predicates.

use std::future::Future;
use std::time::Duration;

/// Retry budget and timing for one class of external call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempt budget, including the first call. Zero behaves as one.
    pub attempts: u32,
    /// Wall-clock deadline applied to each attempt.
    pub attempt_timeout: Duration,
    /// Pause between attempts.
    pub backoff: Duration,
}

/// Failure of a harnessed call.
#[derive(Debug)]
pub enum CallError<E> {
    /// The attempt exceeded its wall-clock deadline and was cancelled.
    Timeout { attempt: u32, timeout: Duration },
    /// The operation itself returned an error.
    Failed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { attempt, timeout } => {
                write!(f, "attempt {attempt} exceeded deadline of {timeout:?}")
            }
            Self::Failed(e) => write!(f, "{e}"),
        }
    }
}

impl<E> CallError<E> {
    /// The underlying operation error, if this wasn't a timeout.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Timeout { .. } => None,
            Self::Failed(e) => Some(e),
        }
    }
}

/// Run `op` under `policy`, retrying errors accepted by `is_retryable`.
pub async fn run_with_retry<T, E, Fut, Op, Pred>(
    policy: &RetryPolicy,
    mut op: Op,
    is_retryable: Pred,
) -> Result<T, CallError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Pred: Fn(&CallError<E>) -> bool,
{
    let budget = policy.attempts.max(1);

    for attempt in 1..=budget {
        let outcome = match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => CallError::Failed(e),
            Err(_) => CallError::Timeout {
                attempt,
                timeout: policy.attempt_timeout,
            },
        };

        if attempt == budget || !is_retryable(&outcome) {
            return Err(outcome);
        }

        tracing::warn!(attempt, budget, "Retryable failure, backing off");
        tokio::time::sleep(policy.backoff).await;
    }

    unreachable!("retry loop returns from its final attempt");
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            attempt_timeout: Duration::from_secs(5),
            backoff: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn first_attempt_success_needs_no_retry() {
        let calls = Cell::new(0u32);
        let result: Result<i32, CallError<&str>> = run_with_retry(
            &policy(3),
            || {
                calls.set(calls.get() + 1);
                async { Ok(42) }
            },
            |_| true,
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_error_is_retried_until_success() {
        let calls = Cell::new(0u32);
        let result: Result<i32, CallError<&str>> = run_with_retry(
            &policy(3),
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { if n < 3 { Err("503") } else { Ok(7) } }
            },
            |_| true,
        )
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn permanent_error_propagates_on_first_attempt() {
        let calls = Cell::new(0u32);
        let result: Result<i32, CallError<&str>> = run_with_retry(
            &policy(3),
            || {
                calls.set(calls.get() + 1);
                async { Err("401") }
            },
            |_| false,
        )
        .await;
        assert!(matches!(result, Err(CallError::Failed("401"))));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_returns_last_error() {
        // Scenario: a 503 that never clears. Budget 3 → exactly 3 attempts.
        let calls = Cell::new(0u32);
        let result: Result<i32, CallError<&str>> = run_with_retry(
            &policy(3),
            || {
                calls.set(calls.get() + 1);
                async { Err("503") }
            },
            |_| true,
        )
        .await;
        assert!(matches!(result, Err(CallError::Failed("503"))));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_exceeded_aborts_without_retry_by_default() {
        let calls = Cell::new(0u32);
        let result: Result<i32, CallError<&str>> = run_with_retry(
            &policy(3),
            || {
                calls.set(calls.get() + 1);
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(1)
                }
            },
            |e| !matches!(e, CallError::Timeout { .. }),
        )
        .await;
        assert!(matches!(result, Err(CallError::Timeout { attempt: 1, .. })));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn predicate_may_opt_into_retrying_timeouts() {
        let calls = Cell::new(0u32);
        let result: Result<i32, CallError<&str>> = run_with_retry(
            &policy(2),
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n == 1 {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    Ok(5)
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(result.unwrap(), 5);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn zero_attempt_budget_still_runs_once() {
        let calls = Cell::new(0u32);
        let result: Result<i32, CallError<&str>> = run_with_retry(
            &policy(0),
            || {
                calls.set(calls.get() + 1);
                async { Ok(9) }
            },
            |_| true,
        )
        .await;
        assert_eq!(result.unwrap(), 9);
        assert_eq!(calls.get(), 1);
    }
}
