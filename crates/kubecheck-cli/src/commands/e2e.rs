//! `kubecheck e2e`: the full cluster probe.
//!
//! ```text
//! reap stale scratch projects (older than 2 × critical)
//! scoped scratch project ─┬─ deploy commands (-n <scratch>)
//!                         ├─ poll route until it has a host
//!                         ├─ HttpProbe::check(url)
//!                         └─ diagnostics, on failure
//! teardown (always) → verdict
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, info_span, warn};

use kubecheck_cluster::runner::{display_command, expand_template};
use kubecheck_cluster::{CommandRunner, DiagnosticsCollector, ScratchManager};
use kubecheck_core::{
    Backoff, CheckFailure, Metric, ProbeConfig, ProbeContext, ProbeError, ProbeResult,
    ValidationPolicy, Verdict, VerdictBuilder,
};
use kubecheck_health::Poller;

use super::{HttpProbe, UrlReport};

/// Measurements of a passing e2e run.
#[derive(Debug)]
struct E2eReport {
    deployed_after: Duration,
    http: UrlReport,
}

pub async fn run(
    ctx: &ProbeContext,
    config: &ProbeConfig,
    runner: Arc<dyn CommandRunner>,
    http: &HttpProbe,
) -> Verdict {
    let scratch = ScratchManager::new(runner.clone(), config.scratch.clone());

    let reap_after = config.thresholds.critical * 2;
    match scratch.cleanup_older_than(ctx, reap_after).await {
        Ok(0) => {}
        Ok(removed) => info!(parent: &ctx.span, removed, "reaped stale scratch projects"),
        Err(e) => warn!(parent: &ctx.span, error = %e, "stale scratch cleanup failed"),
    }

    let diagnostics = DiagnosticsCollector::new(runner.clone(), config.e2e.diagnostic_commands.clone());
    let mut details = Vec::new();
    let collected = &mut details;

    let result = scratch
        .scoped(ctx, |resource| async move {
            let scoped = ctx.child(info_span!(parent: &ctx.span, "scratch", name = %resource.name));
            let result = exercise(&scoped, config, runner.as_ref(), http, &resource.name).await;
            if result.is_err() && config.e2e.diagnostics {
                *collected = diagnostics.collect(&scoped, &resource.name).await;
            }
            result
        })
        .await;

    let elapsed = ctx.deadline.elapsed();
    let mut verdict = VerdictBuilder::new();
    for line in details {
        verdict.detail(line);
    }

    match result {
        Ok(report) => {
            info!(parent: &ctx.span, elapsed = ?elapsed, "e2e probe passed");
            verdict.duration("time", elapsed, &config.thresholds);
            verdict.metric(Metric::duration("deploy", report.deployed_after, &config.thresholds));
            for metric in report.http.metrics() {
                verdict.metric(metric);
            }
            verdict.finish(format!(
                "application deployed and reachable at {} via {} address(es) in {:.1}s",
                report.http.url,
                report.http.consistency.addresses.len(),
                elapsed.as_secs_f64()
            ))
        }
        Err(e) => {
            verdict.error(&e);
            verdict.metric(Metric::duration("time", elapsed, &config.thresholds));
            verdict.finish("")
        }
    }
}

/// Deploy into `name`, find the route and probe it.
async fn exercise(
    ctx: &ProbeContext,
    config: &ProbeConfig,
    runner: &dyn CommandRunner,
    http: &HttpProbe,
    name: &str,
) -> ProbeResult<E2eReport> {
    for template in &config.e2e.deploy {
        if ctx.expired() {
            return Err(ProbeError::Expired {
                what: "deployment".into(),
                elapsed: ctx.deadline.elapsed(),
                last_failure: "deadline reached before all deploy steps ran".into(),
            });
        }
        let mut args = expand_template(template, name);
        args.extend(["-n".to_string(), name.to_string()]);
        runner
            .run_checked_within(&args, call_limit(ctx, config))
            .await
            .map_err(|e| ProbeError::Command(format!("deploy step failed: {e}")))?;
    }
    let deployed_after = ctx.deadline.elapsed();
    info!(parent: &ctx.span, steps = config.e2e.deploy.len(), "application deployed");

    let host = route_host(ctx, config, runner, name).await?;
    let url = config.e2e.url.replace("{host}", &host).replace("{name}", name);
    info!(parent: &ctx.span, %url, "probing route");

    let report = http.check(ctx, &url).await?;
    Ok(E2eReport {
        deployed_after,
        http: report,
    })
}

/// Per-call bound for commands that run inside the deadline.
fn call_limit(ctx: &ProbeContext, config: &ProbeConfig) -> Duration {
    config.cli.command_timeout.min(ctx.remaining())
}

/// Wait for the route to be admitted and return its `spec.host`.
async fn route_host(
    ctx: &ProbeContext,
    config: &ProbeConfig,
    runner: &dyn CommandRunner,
    name: &str,
) -> ProbeResult<String> {
    let args: Vec<String> = ["get", "route", config.e2e.route.as_str(), "-n", name, "-o", "json"]
        .into_iter()
        .map(String::from)
        .collect();
    let what = format!("route {} in {name}", config.e2e.route);

    let mut poller = Poller::new(what, Backoff::from_config(&config.backoff), ValidationPolicy::Retry);
    let found = poller
        .run(ctx, || {
            let args = &args;
            async move {
                let route = runner
                    .capture_json_within(args, call_limit(ctx, config))
                    .await
                    .map_err(|e| CheckFailure::transient(e.to_string()))?;
                route
                    .pointer("/spec/host")
                    .and_then(Value::as_str)
                    .filter(|host| !host.is_empty())
                    .map(String::from)
                    .ok_or_else(|| {
                        CheckFailure::transient(format!("`{}` returned no spec.host", display_command(args)))
                    })
            }
        })
        .await?;
    Ok(found.value)
}
