pub mod cleanup;
pub mod e2e;
pub mod url;

use std::sync::Arc;
use std::time::Duration;

use kubecheck_core::config::HttpConfig;
use kubecheck_core::{Backoff, BackoffConfig, Metric, ProbeConfig, ProbeContext, ProbeError, ProbeResult};
use kubecheck_health::{
    AddressChecker, AttemptBounds, CheckTarget, ConsistencyReport, ContentFetcher, HttpFetcher,
    Resolver, SystemResolver, TlsConfig, poll_target,
};

/// Poll a URL until it serves the expected content, then verify every
/// address behind it. Shared by `url` and `e2e`.
pub struct HttpProbe {
    fetcher: Arc<dyn ContentFetcher>,
    resolver: Arc<dyn Resolver>,
    http: HttpConfig,
    backoff: BackoffConfig,
}

/// What a successful [`HttpProbe::check`] measured.
#[derive(Debug, Clone)]
pub struct UrlReport {
    pub url: String,
    /// Time until the first successful unpinned fetch.
    pub reachable_after: Duration,
    pub poll_attempts: u32,
    pub consistency: ConsistencyReport,
}

impl UrlReport {
    pub fn metrics(&self) -> Vec<Metric> {
        vec![
            Metric::count("addresses", self.consistency.addresses.len() as u64),
            Metric::count("attempts", u64::from(self.poll_attempts + self.consistency.attempts)),
        ]
    }
}

impl HttpProbe {
    /// Build the real HTTP stack. `overrides` are `host:addr[,addr]` pins.
    pub fn from_config(config: &ProbeConfig, overrides: &[String]) -> ProbeResult<Self> {
        let tls = TlsConfig::new(config.http.insecure)?;
        let mut resolver = SystemResolver::new();
        for spec in overrides {
            let (host, addresses) = SystemResolver::parse_override(spec).map_err(ProbeError::config)?;
            resolver = resolver.with_override(&host, addresses);
        }
        Ok(Self::new(
            Arc::new(HttpFetcher::new(&tls)),
            Arc::new(resolver),
            config,
        ))
    }

    pub fn new(fetcher: Arc<dyn ContentFetcher>, resolver: Arc<dyn Resolver>, config: &ProbeConfig) -> Self {
        Self {
            fetcher,
            resolver,
            http: config.http.clone(),
            backoff: config.backoff,
        }
    }

    pub async fn check(&self, ctx: &ProbeContext, url: &str) -> ProbeResult<UrlReport> {
        let target = CheckTarget::new(url, &self.http.pattern, self.http.attempt_timeout)?;
        let policy = self.http.on_mismatch;

        let polled = poll_target(
            ctx,
            self.fetcher.as_ref(),
            &target,
            Backoff::from_config(&self.backoff),
            policy,
        )
        .await?;

        let consistency = AddressChecker::new(
            self.resolver.clone(),
            self.fetcher.clone(),
            Backoff::from_config(&self.backoff),
            policy,
        )
        .with_bounds(AttemptBounds {
            min: self.http.address_timeout_min,
            max: self.http.address_timeout_max,
        })
        .verify(ctx, &target)
        .await?;

        Ok(UrlReport {
            url: target.url.to_string(),
            reachable_after: polled.elapsed,
            poll_attempts: polled.attempts,
            consistency,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory HTTP stack for driver tests.

    use std::collections::HashMap;
    use std::io;
    use std::net::IpAddr;
    use std::time::Duration;

    use bytes::Bytes;
    use kubecheck_core::CheckFailure;
    use kubecheck_health::fetch::{FetchFuture, FetchResponse};
    use kubecheck_health::resolve::ResolveFuture;
    use kubecheck_health::{ContentFetcher, ProbeUrl, Resolver};

    /// Serves fixed content for known hosts and refuses everything else.
    pub struct StaticWeb {
        up: HashMap<String, String>,
    }

    impl StaticWeb {
        pub fn serving(host: &str, content: &str) -> Self {
            Self {
                up: HashMap::from([(host.to_string(), content.to_string())]),
            }
        }

        pub fn down() -> Self {
            Self { up: HashMap::new() }
        }
    }

    impl ContentFetcher for StaticWeb {
        fn fetch<'a>(&'a self, url: &'a ProbeUrl, pin: Option<IpAddr>, _timeout: Duration) -> FetchFuture<'a> {
            Box::pin(async move {
                match self.up.get(url.host()) {
                    Some(content) => Ok(FetchResponse {
                        status: http::StatusCode::OK,
                        body: Bytes::from(content.clone()),
                    }),
                    None => Err(CheckFailure::transient(format!(
                        "connection to {url} via {pin:?} refused"
                    ))),
                }
            })
        }
    }

    /// Resolves every host to the same fixed addresses.
    pub struct FixedResolver(pub Vec<IpAddr>);

    impl Resolver for FixedResolver {
        fn resolve<'a>(&'a self, _host: &'a str, _port: u16) -> ResolveFuture<'a> {
            let addresses = self.0.clone();
            Box::pin(async move { Ok::<_, io::Error>(addresses) })
        }
    }
}
