//! Multi-address consistency checker.
//!
//! A load-balanced route can look healthy to a client that happens to hit a
//! good backend while another address is broken. The checker resolves the
//! host to every address and requires each one, contacted directly with the
//! original hostname, to serve the expected content before the deadline.
//!
//! Addresses are verified one at a time. Failures of a round are collected
//! and only those are retried in the next round, after a backoff sleep.
//! Each attempt's timeout is taken from the time left when it starts, and a
//! round stops as soon as the deadline passes; addresses it never reached
//! are reported as failing.
//!
//! Content mismatches follow the configured [`ValidationPolicy`], the same
//! value the single-target poller uses: `Retry` requeues the address like a
//! connection failure, `Abort` fails the whole check on the first mismatch.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use kubecheck_core::{Backoff, ProbeContext, ProbeError, ProbeResult, ValidationPolicy};

use crate::fetch::{ContentFetcher, fetch_and_validate};
use crate::resolve::{AddressFamily, Resolver, dedup_addresses};
use crate::target::CheckTarget;

/// Bounds on the per-address attempt timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBounds {
    pub min: Duration,
    pub max: Duration,
}

impl AttemptBounds {
    /// Remaining deadline clamped into `[min, max]`, never past the deadline:
    /// with less than `min` left the attempt gets what remains.
    pub fn timeout_for(&self, remaining: Duration) -> Duration {
        remaining.clamp(self.min, self.max.max(self.min)).min(remaining)
    }
}

impl Default for AttemptBounds {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(10),
            max: Duration::from_secs(300),
        }
    }
}

/// One resolved address awaiting verification.
#[derive(Debug, Clone)]
pub struct AddressCandidate {
    pub addr: IpAddr,
    pub family: AddressFamily,
    /// Timeout of the latest attempt against this address.
    pub timeout: Duration,
    pub attempts: u32,
    pub last_failure: Option<String>,
}

impl AddressCandidate {
    fn new(addr: IpAddr) -> Self {
        Self {
            addr,
            family: AddressFamily::of(&addr),
            timeout: Duration::ZERO,
            attempts: 0,
            last_failure: None,
        }
    }

    /// Record that the deadline passed before this address got its turn.
    fn skipped(mut self) -> Self {
        self.last_failure
            .get_or_insert_with(|| "not checked before the deadline".to_string());
        self
    }
}

/// Summary of a successful consistency check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub addresses: Vec<IpAddr>,
    /// Address checks performed across all rounds.
    pub attempts: u32,
    pub rounds: u32,
    pub elapsed: Duration,
}

pub struct AddressChecker {
    resolver: Arc<dyn Resolver>,
    fetcher: Arc<dyn ContentFetcher>,
    backoff: Backoff,
    policy: ValidationPolicy,
    bounds: AttemptBounds,
}

impl AddressChecker {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        fetcher: Arc<dyn ContentFetcher>,
        backoff: Backoff,
        policy: ValidationPolicy,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            backoff,
            policy,
            bounds: AttemptBounds::default(),
        }
    }

    pub fn with_bounds(mut self, bounds: AttemptBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Verify every address of `target`'s host serves the expected content.
    pub async fn verify(
        &mut self,
        ctx: &ProbeContext,
        target: &CheckTarget,
    ) -> ProbeResult<ConsistencyReport> {
        let start = Instant::now();
        let url = &target.url;

        let resolved = self
            .resolver
            .resolve(url.host(), url.port())
            .await
            .map_err(|e| ProbeError::Resolve {
                host: url.host().to_string(),
                reason: e.to_string(),
            })?;
        let addresses = dedup_addresses(resolved);
        if addresses.is_empty() {
            return Err(ProbeError::config(format!(
                "{} resolved to no addresses",
                url.host()
            )));
        }

        info!(
            parent: &ctx.span,
            %url,
            addresses = ?addresses,
            "verifying content via every address"
        );

        let mut queue: VecDeque<AddressCandidate> =
            addresses.iter().map(|addr| AddressCandidate::new(*addr)).collect();
        let mut failed: Vec<AddressCandidate> = Vec::new();
        let mut attempts = 0;
        let mut rounds = 0;

        loop {
            rounds += 1;
            debug!(parent: &ctx.span, round = rounds, queued = queue.len(), "address round");

            while let Some(mut candidate) = queue.pop_front() {
                if ctx.expired() {
                    debug!(parent: &ctx.span, unchecked = queue.len() + 1, "deadline reached mid-round");
                    failed.push(candidate.skipped());
                    failed.extend(queue.drain(..).map(AddressCandidate::skipped));
                    break;
                }

                attempts += 1;
                candidate.attempts += 1;
                candidate.timeout = self.bounds.timeout_for(ctx.remaining());

                let result = fetch_and_validate(
                    self.fetcher.as_ref(),
                    target,
                    Some(candidate.addr),
                    candidate.timeout,
                )
                .await;

                match result {
                    Ok(_) => {
                        debug!(
                            parent: &ctx.span,
                            addr = %candidate.addr,
                            family = %candidate.family,
                            attempts = candidate.attempts,
                            "address verified"
                        );
                    }
                    Err(failure) if failure.is_validation() && self.policy == ValidationPolicy::Abort => {
                        warn!(parent: &ctx.span, addr = %candidate.addr, reason = %failure, "content mismatch, aborting");
                        return Err(ProbeError::Validation {
                            what: format!("{url} via {}", candidate.addr),
                            reason: failure.message().to_string(),
                        });
                    }
                    Err(failure) => {
                        debug!(
                            parent: &ctx.span,
                            addr = %candidate.addr,
                            reason = %failure,
                            "address check failed"
                        );
                        candidate.last_failure = Some(failure.message().to_string());
                        failed.push(candidate);
                    }
                }
            }

            if failed.is_empty() {
                let elapsed = start.elapsed();
                info!(
                    parent: &ctx.span,
                    %url,
                    addresses = addresses.len(),
                    attempts,
                    rounds,
                    elapsed = ?elapsed,
                    "all addresses verified"
                );
                return Ok(ConsistencyReport {
                    addresses,
                    attempts,
                    rounds,
                    elapsed,
                });
            }

            if ctx.expired() {
                let failing: Vec<String> = failed
                    .iter()
                    .map(|c| {
                        format!(
                            "{}: {}",
                            c.addr,
                            c.last_failure.as_deref().unwrap_or("unknown failure")
                        )
                    })
                    .collect();
                warn!(parent: &ctx.span, %url, failing = ?failing, "deadline expired with failing addresses");
                return Err(ProbeError::Unavailable {
                    url: url.to_string(),
                    elapsed: start.elapsed(),
                    failing,
                });
            }

            let slept = self.backoff.sleep(ctx.remaining()).await;
            debug!(parent: &ctx.span, failed = failed.len(), slept = ?slept, "retrying failed addresses");
            queue.extend(failed.drain(..));
        }
    }
}
