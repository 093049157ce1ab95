//! `kubecheck url`: probe a fixed URL through every address.

use tracing::info;

use kubecheck_core::{Metric, ProbeConfig, ProbeContext, Verdict, VerdictBuilder};

use super::HttpProbe;

pub async fn run(ctx: &ProbeContext, config: &ProbeConfig, http: &HttpProbe, url: &str) -> Verdict {
    let mut verdict = VerdictBuilder::new();
    let result = http.check(ctx, url).await;
    let elapsed = ctx.deadline.elapsed();

    match result {
        Ok(report) => {
            info!(parent: &ctx.span, url = %report.url, elapsed = ?elapsed, "url probe passed");
            verdict.duration("time", elapsed, &config.thresholds);
            for metric in report.metrics() {
                verdict.metric(metric);
            }
            verdict.finish(format!(
                "{} serves expected content via {} address(es) in {:.1}s",
                report.url,
                report.consistency.addresses.len(),
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

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use kubecheck_core::Severity;

    use super::*;
    use crate::commands::testing::{FixedResolver, StaticWeb};

    fn addrs(list: &[&str]) -> Vec<IpAddr> {
        list.iter().map(|a| a.parse().unwrap()).collect()
    }

    fn config() -> ProbeConfig {
        let mut config = ProbeConfig::default();
        config.http.pattern = "Hello".into();
        config.thresholds.warning = Duration::from_secs(5);
        config.thresholds.critical = Duration::from_secs(20);
        config
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_url_is_ok_with_metrics() {
        let config = config();
        let http = HttpProbe::new(
            Arc::new(StaticWeb::serving("app.example.com", "Hello world")),
            Arc::new(FixedResolver(addrs(&["10.0.0.1", "10.0.0.2"]))),
            &config,
        );
        let ctx = ProbeContext::with_budget(config.thresholds.critical);

        let verdict = run(&ctx, &config, &http, "http://app.example.com/").await;

        assert_eq!(verdict.severity, Severity::Ok);
        assert_eq!(
            verdict.status_line(),
            "OK: http://app.example.com/ serves expected content via 2 address(es) in 0.0s \
             | time=0s;5;20;0 addresses=2;;;0 attempts=3;;;0"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_url_is_critical_after_deadline() {
        let config = config();
        let http = HttpProbe::new(
            Arc::new(StaticWeb::down()),
            Arc::new(FixedResolver(addrs(&["10.0.0.1"]))),
            &config,
        );
        let ctx = ProbeContext::with_budget(config.thresholds.critical);

        let verdict = run(&ctx, &config, &http, "http://app.example.com/").await;

        assert_eq!(verdict.severity, Severity::Critical);
        assert!(verdict.message.starts_with("GET http://app.example.com/ failed after 20.0 seconds"), "{}", verdict.message);
        assert!(ctx.expired());
    }

    #[tokio::test]
    async fn bad_url_is_unknown() {
        let config = config();
        let http = HttpProbe::new(
            Arc::new(StaticWeb::down()),
            Arc::new(FixedResolver(Vec::new())),
            &config,
        );
        let ctx = ProbeContext::with_budget(config.thresholds.critical);

        let verdict = run(&ctx, &config, &http, "ftp://app.example.com/").await;
        assert_eq!(verdict.severity, Severity::Unknown);
        assert_eq!(verdict.exit_code(), 3);
    }
}
