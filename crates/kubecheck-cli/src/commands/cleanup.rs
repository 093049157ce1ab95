//! `kubecheck cleanup`: reap stale scratch projects.

use std::sync::Arc;
use std::time::Duration;

use kubecheck_cluster::{CommandRunner, ScratchManager};
use kubecheck_core::{Metric, ProbeConfig, ProbeContext, Verdict, VerdictBuilder};

pub async fn run(
    ctx: &ProbeContext,
    runner: Arc<dyn CommandRunner>,
    config: &ProbeConfig,
    threshold: Duration,
) -> Verdict {
    let scratch = ScratchManager::new(runner, config.scratch.clone());
    let mut verdict = VerdictBuilder::new();

    match scratch.cleanup_older_than(ctx, threshold).await {
        Ok(removed) => {
            verdict.metric(Metric::count("removed", removed as u64));
            verdict.finish(format!(
                "removed {removed} scratch project(s) older than {}s",
                threshold.as_secs()
            ))
        }
        Err(e) => {
            verdict.error(&e);
            verdict.finish("")
        }
    }
}

#[cfg(test)]
mod tests {
    use kubecheck_cluster::fake::ScriptedRunner;
    use kubecheck_core::Severity;

    use super::*;

    #[tokio::test]
    async fn reports_removed_count() {
        let listing = serde_json::json!({
            "items": [
                { "metadata": { "name": "kubecheck-e2e-1000-00000000", "creationTimestamp": "2001-01-01T00:00:00Z" } },
                { "metadata": { "name": "kubecheck-e2e-2000-00000000", "creationTimestamp": "2001-01-01T00:00:00Z" } },
                { "metadata": { "name": "openshift-monitoring", "creationTimestamp": "2001-01-01T00:00:00Z" } }
            ]
        });
        let runner = Arc::new(ScriptedRunner::new().on_stdout(&["get", "projects"], &listing.to_string()));
        let ctx = ProbeContext::with_budget(Duration::from_secs(60));

        let verdict = run(&ctx, runner.clone(), &ProbeConfig::default(), Duration::from_secs(1800)).await;

        assert_eq!(verdict.severity, Severity::Ok);
        assert_eq!(
            verdict.status_line(),
            "OK: removed 2 scratch project(s) older than 1800s | removed=2;;;0"
        );
        assert_eq!(runner.count(&["delete", "project"]), 2);
    }

    #[tokio::test]
    async fn listing_failure_is_critical() {
        let runner = Arc::new(ScriptedRunner::new().on_failure(&["get", "projects"], "Unauthorized"));
        let ctx = ProbeContext::with_budget(Duration::from_secs(60));

        let verdict = run(&ctx, runner, &ProbeConfig::default(), Duration::from_secs(1800)).await;

        assert_eq!(verdict.severity, Severity::Critical);
        assert!(verdict.message.contains("Unauthorized"), "{}", verdict.message);
    }
}
