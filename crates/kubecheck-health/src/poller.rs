//! Single-target poller: retry one check until it succeeds or the
//! deadline runs out.
//!
//! ```text
//! Idle → Attempting ─ok──────────────→ Success
//!            │ fail, time left         ▲
//!            ▼                         │
//!        RetryWait ─backoff sleep─→ Attempting
//!            fail, no time left ─────→ Expired
//!            mismatch, abort policy ─→ Aborted
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use kubecheck_core::{Backoff, CheckFailure, ProbeContext, ProbeError, ProbeResult, ValidationPolicy};

use crate::fetch::{ContentFetcher, FetchResponse, fetch_and_validate};
use crate::target::CheckTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Attempting,
    RetryWait,
    Success,
    Expired,
    Aborted,
}

/// Value returned by the check plus how long polling took.
#[derive(Debug, Clone)]
pub struct PollSuccess<T> {
    pub value: T,
    /// Time from poll start until the successful attempt finished.
    pub elapsed: Duration,
    pub attempts: u32,
}

#[derive(Debug)]
pub struct Poller {
    what: String,
    backoff: Backoff,
    policy: ValidationPolicy,
    state: PollState,
    attempts: u32,
    last_failure: Option<CheckFailure>,
}

impl Poller {
    /// `what` names the polled operation in logs and failure messages.
    pub fn new(what: impl Into<String>, backoff: Backoff, policy: ValidationPolicy) -> Self {
        Self {
            what: what.into(),
            backoff,
            policy,
            state: PollState::Idle,
            attempts: 0,
            last_failure: None,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_failure(&self) -> Option<&CheckFailure> {
        self.last_failure.as_ref()
    }

    /// Run `attempt` until it succeeds, the deadline in `ctx` expires, or a
    /// validation failure hits the abort policy.
    pub async fn run<F, Fut, T>(&mut self, ctx: &ProbeContext, mut attempt: F) -> ProbeResult<PollSuccess<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CheckFailure>>,
    {
        let start = Instant::now();
        self.state = PollState::Attempting;
        debug!(parent: &ctx.span, what = %self.what, remaining = ?ctx.remaining(), "polling started");

        loop {
            self.attempts += 1;
            let failure = match attempt().await {
                Ok(value) => {
                    self.state = PollState::Success;
                    let elapsed = start.elapsed();
                    info!(
                        parent: &ctx.span,
                        what = %self.what,
                        attempts = self.attempts,
                        elapsed = ?elapsed,
                        "polling succeeded"
                    );
                    return Ok(PollSuccess {
                        value,
                        elapsed,
                        attempts: self.attempts,
                    });
                }
                Err(failure) => failure,
            };

            debug!(
                parent: &ctx.span,
                what = %self.what,
                attempt = self.attempts,
                reason = %failure,
                "attempt failed"
            );

            if failure.is_validation() && self.policy == ValidationPolicy::Abort {
                self.state = PollState::Aborted;
                warn!(parent: &ctx.span, what = %self.what, reason = %failure, "content mismatch, aborting");
                let reason = failure.message().to_string();
                self.last_failure = Some(failure);
                return Err(ProbeError::Validation {
                    what: self.what.clone(),
                    reason,
                });
            }
            self.last_failure = Some(failure);

            if ctx.expired() {
                self.state = PollState::Expired;
                let last_failure = self
                    .last_failure
                    .as_ref()
                    .map(|f| f.message().to_string())
                    .unwrap_or_default();
                warn!(
                    parent: &ctx.span,
                    what = %self.what,
                    attempts = self.attempts,
                    reason = %last_failure,
                    "deadline expired while polling"
                );
                return Err(ProbeError::Expired {
                    what: self.what.clone(),
                    elapsed: start.elapsed(),
                    last_failure,
                });
            }

            self.state = PollState::RetryWait;
            let slept = self.backoff.sleep(ctx.remaining()).await;
            debug!(parent: &ctx.span, what = %self.what, slept = ?slept, "retrying");
            self.state = PollState::Attempting;
        }
    }
}

/// Poll `target` without an address pin until it serves the expected content.
pub async fn poll_target(
    ctx: &ProbeContext,
    fetcher: &dyn ContentFetcher,
    target: &CheckTarget,
    backoff: Backoff,
    policy: ValidationPolicy,
) -> ProbeResult<PollSuccess<FetchResponse>> {
    let mut poller = Poller::new(format!("GET {}", target.url), backoff, policy);
    poller
        .run(ctx, || fetch_and_validate(fetcher, target, None, target.timeout.min(attempt_budget(ctx))))
        .await
}

/// Per-attempt timeout never below one second so a nearly expired deadline
/// still gets one real attempt.
fn attempt_budget(ctx: &ProbeContext) -> Duration {
    ctx.remaining().max(Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn backoff() -> Backoff {
        Backoff::new(Duration::from_secs(1), Duration::from_secs(4))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_first_attempt_within_budget() {
        let ctx = ProbeContext::with_budget(Duration::from_secs(1));
        let mut poller = Poller::new("check", backoff(), ValidationPolicy::Retry);

        let result = poller
            .run(&ctx, || async { Ok::<_, CheckFailure>("up") })
            .await
            .unwrap();

        assert_eq!(result.value, "up");
        assert_eq!(result.attempts, 1);
        assert!(result.elapsed < Duration::from_secs(1));
        assert_eq!(poller.state(), PollState::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_until_success() {
        let ctx = ProbeContext::with_budget(Duration::from_secs(60));
        let mut poller = Poller::new("check", backoff(), ValidationPolicy::Retry);
        let calls = Cell::new(0);

        let result = poller
            .run(&ctx, || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(CheckFailure::transient("connection refused"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.value, 3);
        assert_eq!(result.attempts, 3);
        // Slept 1s then 2s.
        assert_eq!(result.elapsed, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_expires_exactly_at_deadline() {
        let ctx = ProbeContext::with_budget(Duration::from_secs(10));
        let mut poller = Poller::new("GET http://app/", backoff(), ValidationPolicy::Retry);

        let err = poller
            .run(&ctx, || async { Err::<(), _>(CheckFailure::transient("connection refused")) })
            .await
            .unwrap_err();

        // Attempts at t=0, 1, 3, 7 and 10 (last sleep capped at the 3s left).
        assert_eq!(poller.attempts(), 5);
        assert_eq!(poller.state(), PollState::Expired);
        assert!(ctx.expired());
        assert_eq!(ctx.deadline.elapsed(), Duration::from_secs(10));
        match err {
            ProbeError::Expired {
                what,
                elapsed,
                last_failure,
            } => {
                assert_eq!(what, "GET http://app/");
                assert_eq!(elapsed, Duration::from_secs(10));
                assert_eq!(last_failure, "connection refused");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn mismatch_is_retried_under_retry_policy() {
        let ctx = ProbeContext::with_budget(Duration::from_secs(30));
        let mut poller = Poller::new("check", backoff(), ValidationPolicy::Retry);
        let calls = Cell::new(0);

        let result = poller
            .run(&ctx, || {
                calls.set(calls.get() + 1);
                let first = calls.get() == 1;
                async move {
                    if first {
                        Err(CheckFailure::validation("pattern not found"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(poller.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn mismatch_aborts_immediately_under_abort_policy() {
        let ctx = ProbeContext::with_budget(Duration::from_secs(30));
        let mut poller = Poller::new("check", backoff(), ValidationPolicy::Abort);

        let err = poller
            .run(&ctx, || async { Err::<(), _>(CheckFailure::validation("pattern not found")) })
            .await
            .unwrap_err();

        assert!(matches!(err, ProbeError::Validation { .. }));
        assert_eq!(poller.attempts(), 1);
        assert_eq!(poller.state(), PollState::Aborted);
        assert_eq!(ctx.deadline.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_still_retried_under_abort_policy() {
        let ctx = ProbeContext::with_budget(Duration::from_secs(30));
        let mut poller = Poller::new("check", backoff(), ValidationPolicy::Abort);
        let calls = Cell::new(0);

        let result = poller
            .run(&ctx, || {
                calls.set(calls.get() + 1);
                let first = calls.get() == 1;
                async move {
                    if first {
                        Err(CheckFailure::transient("HTTP 503"))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert!(poller.last_failure().is_some());
    }
}
