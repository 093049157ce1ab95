//! End-to-end probes against a local hyper server.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use kubecheck_core::{Backoff, ProbeContext, ProbeError, ValidationPolicy};
use kubecheck_health::{
    AddressChecker, CheckTarget, ContentFetcher, HttpFetcher, SystemResolver, TlsConfig,
    fetch_and_validate, poll_target,
};

/// Serves `/` with a greeting that echoes the Host header and `/down` with 503.
async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let svc = service_fn(|req: Request<Incoming>| async move {
                    let host = req
                        .headers()
                        .get("host")
                        .and_then(|h| h.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    let resp = if req.uri().path() == "/down" {
                        Response::builder()
                            .status(503)
                            .body(Full::new(Bytes::from("Service Unavailable")))
                    } else {
                        Response::builder()
                            .status(200)
                            .body(Full::new(Bytes::from(format!("Hello kubecheck, host={host}"))))
                    };
                    Ok::<_, hyper::Error>(resp.unwrap())
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    addr
}

fn fetcher() -> Arc<HttpFetcher> {
    Arc::new(HttpFetcher::new(&TlsConfig::insecure().unwrap()))
}

fn localhost() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

#[tokio::test]
async fn pinned_fetch_presents_original_hostname() {
    let addr = spawn_server().await;
    let target = CheckTarget::new(
        &format!("http://app.apps.test:{}/", addr.port()),
        "Hello kubecheck",
        Duration::from_secs(5),
    )
    .unwrap();

    let resp = fetch_and_validate(fetcher().as_ref(), &target, Some(localhost()), Duration::from_secs(5))
        .await
        .unwrap();

    let body = String::from_utf8_lossy(&resp.body).to_string();
    assert_eq!(body, format!("Hello kubecheck, host=app.apps.test:{}", addr.port()));
}

#[tokio::test]
async fn non_2xx_is_transient() {
    let addr = spawn_server().await;
    let target = CheckTarget::new(
        &format!("http://127.0.0.1:{}/down", addr.port()),
        ".",
        Duration::from_secs(5),
    )
    .unwrap();

    let err = fetch_and_validate(fetcher().as_ref(), &target, None, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(!err.is_validation());
    assert!(err.message().contains("503"), "{err}");
}

#[tokio::test]
async fn body_limit_fails_attempt() {
    let addr = spawn_server().await;
    let url = kubecheck_health::ProbeUrl::parse(&format!("http://127.0.0.1:{}/", addr.port())).unwrap();

    let small = HttpFetcher::new(&TlsConfig::insecure().unwrap()).with_max_body(4);
    let err = small.fetch(&url, None, Duration::from_secs(5)).await.unwrap_err();
    assert!(err.message().contains("reading response"), "{err}");
}

#[tokio::test]
async fn poll_then_verify_every_address() {
    let addr = spawn_server().await;
    let url = format!("http://app.apps.test:{}/", addr.port());
    let target = CheckTarget::new(&url, "Hello", Duration::from_secs(5)).unwrap();
    let ctx = ProbeContext::with_budget(Duration::from_secs(10));

    let poll_target_url = format!("http://127.0.0.1:{}/", addr.port());
    let direct = CheckTarget::new(&poll_target_url, "Hello", Duration::from_secs(5)).unwrap();
    let polled = poll_target(
        &ctx,
        fetcher().as_ref(),
        &direct,
        Backoff::default(),
        ValidationPolicy::Retry,
    )
    .await
    .unwrap();
    assert_eq!(polled.attempts, 1);

    let resolver = SystemResolver::new().with_override("app.apps.test", vec![localhost()]);
    let report = AddressChecker::new(
        Arc::new(resolver),
        fetcher(),
        Backoff::default(),
        ValidationPolicy::Retry,
    )
    .verify(&ctx, &target)
    .await
    .unwrap();

    assert_eq!(report.addresses, vec![localhost()]);
    assert_eq!(report.rounds, 1);
}

#[tokio::test]
async fn content_mismatch_aborts_with_abort_policy() {
    let addr = spawn_server().await;
    let target = CheckTarget::new(
        &format!("http://app.apps.test:{}/", addr.port()),
        "Goodbye",
        Duration::from_secs(5),
    )
    .unwrap();
    let ctx = ProbeContext::with_budget(Duration::from_secs(10));

    let resolver = SystemResolver::new().with_override("app.apps.test", vec![localhost()]);
    let err = AddressChecker::new(
        Arc::new(resolver),
        fetcher(),
        Backoff::default(),
        ValidationPolicy::Abort,
    )
    .verify(&ctx, &target)
    .await
    .unwrap_err();

    assert!(matches!(err, ProbeError::Validation { .. }), "{err}");
}
