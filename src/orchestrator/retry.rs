use super::cancel::CancellationToken;
use crate::connection::config::RetryPolicy;
use crate::core::{CloudError, Result};
use crate::settings::ExecutionMode;
use log::warn;
use std::future::Future;
use std::time::Duration;

/// What to do after an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Issue the same request again after the delay.
    Retry(Duration),
    /// Surface the error to the caller.
    Fail,
}

/// Drives one request through Pending, Issued and a terminal state,
/// re-issuing it unchanged on transient operation-level failures.
///
/// The budget counts attempts, the first one included. When it runs out the
/// caller sees the last real error, never a synthetic "retries exhausted".
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Attempts allowed for one request under `mode`.
    pub fn budget(&self, mode: ExecutionMode) -> u32 {
        if mode.retry_transient {
            self.policy.max_attempts.max(1)
        } else {
            1
        }
    }

    /// Classifies the failure of attempt number `attempt` (1-based).
    pub fn decide(&self, attempt: u32, mode: ExecutionMode, error: &CloudError) -> RetryDecision {
        if !error.is_retriable() || attempt >= self.budget(mode) {
            return RetryDecision::Fail;
        }
        RetryDecision::Retry(self.policy.delay_for(attempt, error.retry_after()))
    }

    /// Runs `operation` until it succeeds, fails permanently, exhausts the
    /// budget or `cancel` fires.
    ///
    /// `operation` receives the 1-based attempt number. A result that arrives
    /// after cancellation is discarded.
    pub async fn execute<T, F, Fut>(
        &self,
        label: &str,
        mode: ExecutionMode,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let budget = self.budget(mode);
        let mut attempt = 1u32;
        loop {
            cancel.check()?;
            let result = operation(attempt).await;
            cancel.check()?;

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match self.decide(attempt, mode, &err) {
                RetryDecision::Fail => {
                    if err.is_retriable() && budget > 1 {
                        warn!(
                            "{} giving up after {} attempts: {}",
                            label, attempt, err
                        );
                    }
                    return Err(err);
                }
                RetryDecision::Retry(delay) => {
                    warn!(
                        "{} retry on transient error (attempt {} of {}): {} (backoff={}ms)",
                        label,
                        attempt,
                        budget,
                        err,
                        delay.as_millis()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(CloudError::Cancelled),
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorCode;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    const RETRYING: ExecutionMode = ExecutionMode {
        split_oversized: false,
        retry_transient: true,
    };

    fn controller(max_attempts: u32) -> RetryController {
        RetryController::new(RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            ..RetryPolicy::default()
        })
    }

    fn busy(n: u32) -> CloudError {
        CloudError::service(ErrorCode::ZoneBusy, format!("busy #{n}"))
    }

    #[test]
    fn test_decide() {
        let c = controller(3);
        assert_eq!(
            c.decide(1, RETRYING, &busy(1)),
            RetryDecision::Retry(Duration::from_millis(1))
        );
        assert_eq!(
            c.decide(2, RETRYING, &busy(2)),
            RetryDecision::Retry(Duration::from_millis(2))
        );
        assert_eq!(c.decide(3, RETRYING, &busy(3)), RetryDecision::Fail);
        assert_eq!(c.decide(1, ExecutionMode::NO_RETRY, &busy(1)), RetryDecision::Fail);

        let auth = CloudError::service(ErrorCode::NotAuthenticated, "no account");
        assert_eq!(c.decide(1, RETRYING, &auth), RetryDecision::Fail);
    }

    #[test]
    fn test_decide_uses_server_hint() {
        let c = controller(3);
        let limited = CloudError::service_with_retry_after(
            ErrorCode::RequestRateLimited,
            "slow down",
            Duration::from_millis(30),
        );
        assert_eq!(
            c.decide(1, RETRYING, &limited),
            RetryDecision::Retry(Duration::from_millis(30))
        );
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let c = controller(3);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = c
            .execute("test", RETRYING, &CancellationToken::new(), |attempt| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 { Err(busy(attempt)) } else { Ok(attempt) }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_surfaces_last_error() {
        let c = controller(3);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = c
            .execute("test", RETRYING, &CancellationToken::new(), |attempt| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(busy(attempt))
                }
            })
            .await;

        assert_eq!(result, Err(busy(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let c = controller(5);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let conflict = CloudError::service(ErrorCode::ServerRecordChanged, "stale");
        let expected = conflict.clone();

        let result: Result<()> = c
            .execute("test", RETRYING, &CancellationToken::new(), |_| {
                let counter = Arc::clone(&counter);
                let conflict = conflict.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(conflict)
                }
            })
            .await;

        assert_eq!(result, Err(expected));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_disabled_issues_once() {
        let c = controller(5);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = c
            .execute("test", ExecutionMode::NO_RETRY, &CancellationToken::new(), |attempt| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(busy(attempt))
                }
            })
            .await;

        assert_eq!(result, Err(busy(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let c = RetryController::new(RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 10_000,
            max_backoff_ms: 10_000,
            ..RetryPolicy::default()
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result: Result<()> = c
            .execute("test", RETRYING, &cancel, |attempt| async move { Err(busy(attempt)) })
            .await;

        assert_eq!(result, Err(CloudError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_result_arriving_after_cancel_is_discarded() {
        let c = controller(3);
        let cancel = CancellationToken::new();
        let in_flight = cancel.clone();

        let result = c
            .execute("test", RETRYING, &cancel, |_| {
                let in_flight = in_flight.clone();
                async move {
                    in_flight.cancel();
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, Err(CloudError::Cancelled));
    }
}
