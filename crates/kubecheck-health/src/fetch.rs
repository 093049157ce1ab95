//! HTTP fetches against a probe URL, optionally pinned to one address.
//!
//! A pinned fetch connects to the literal IP but still sends the URL's
//! hostname as `Host` (and as TLS SNI), so virtual-host routing in front of
//! the address behaves exactly as for a normal client.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use http::header::{CONNECTION, HOST, USER_AGENT};
use http_body_util::{BodyExt, Empty, Limited};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use kubecheck_core::CheckFailure;

use crate::target::{CheckTarget, ProbeUrl, Scheme};
use crate::tls::TlsConfig;

/// Response bodies beyond this size fail the attempt.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Status and body of one fetch.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Boxed future alias for fetch results.
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<FetchResponse, CheckFailure>> + Send + 'a>>;

/// Performs one GET. Injected so checkers can be driven without a network.
pub trait ContentFetcher: Send + Sync {
    /// Fetch `url`, connecting to `pin` instead of resolving the host when set.
    ///
    /// Every error is a [`CheckFailure::Transient`]; judging the content is
    /// left to [`CheckTarget::validate`].
    fn fetch<'a>(&'a self, url: &'a ProbeUrl, pin: Option<IpAddr>, timeout: Duration)
    -> FetchFuture<'a>;
}

/// Fetch the target and validate the response.
pub async fn fetch_and_validate(
    fetcher: &dyn ContentFetcher,
    target: &CheckTarget,
    pin: Option<IpAddr>,
    timeout: Duration,
) -> Result<FetchResponse, CheckFailure> {
    let response = fetcher.fetch(&target.url, pin, timeout).await?;
    target.validate(&response)?;
    Ok(response)
}

/// `ContentFetcher` speaking HTTP/1.1 over TCP or TLS via hyper.
pub struct HttpFetcher {
    tls: TlsConnector,
    user_agent: String,
    max_body: usize,
}

impl HttpFetcher {
    pub fn new(tls: &TlsConfig) -> Self {
        Self {
            tls: TlsConnector::from(tls.client_config.clone()),
            user_agent: format!("kubecheck/{}", env!("CARGO_PKG_VERSION")),
            max_body: MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    async fn fetch_inner(
        &self,
        url: &ProbeUrl,
        pin: Option<IpAddr>,
    ) -> Result<FetchResponse, CheckFailure> {
        let connected = match pin {
            Some(ip) => TcpStream::connect(SocketAddr::new(ip, url.port())).await,
            None => TcpStream::connect((url.host(), url.port())).await,
        };
        let stream = connected.map_err(|e| {
            debug!(error = %e, %url, ?pin, "probe connection failed");
            CheckFailure::transient(format!("connection to {}{} failed: {e}", url, via(pin)))
        })?;

        match url.scheme() {
            Scheme::Http => self.send(stream, url, pin).await,
            Scheme::Https => {
                let server_name = ServerName::try_from(url.host().to_string()).map_err(|e| {
                    CheckFailure::transient(format!("invalid TLS server name {}: {e}", url.host()))
                })?;
                let stream = self.tls.connect(server_name, stream).await.map_err(|e| {
                    debug!(error = %e, %url, ?pin, "probe TLS handshake failed");
                    CheckFailure::transient(format!("TLS handshake with {}{} failed: {e}", url, via(pin)))
                })?;
                self.send(stream, url, pin).await
            }
        }
    }

    async fn send<I>(
        &self,
        io: I,
        url: &ProbeUrl,
        pin: Option<IpAddr>,
    ) -> Result<FetchResponse, CheckFailure>
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sender, conn) =
            hyper::client::conn::http1::handshake::<_, Empty<Bytes>>(TokioIo::new(io))
                .await
                .map_err(|e| {
                    CheckFailure::transient(format!("HTTP handshake with {}{} failed: {e}", url, via(pin)))
                })?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(url.path())
            .header(HOST, url.authority())
            .header(USER_AGENT, &self.user_agent)
            .header(CONNECTION, "close")
            .body(Empty::<Bytes>::new())
            .map_err(|e| CheckFailure::transient(format!("cannot build request for {url}: {e}")))?;

        let resp = sender.send_request(req).await.map_err(|e| {
            debug!(error = %e, %url, ?pin, "probe request failed");
            CheckFailure::transient(format!("request to {}{} failed: {e}", url, via(pin)))
        })?;

        let status = resp.status();
        let body = Limited::new(resp.into_body(), self.max_body)
            .collect()
            .await
            .map_err(|e| {
                CheckFailure::transient(format!("reading response from {}{} failed: {e}", url, via(pin)))
            })?
            .to_bytes();

        debug!(%url, ?pin, %status, bytes = body.len(), "probe response received");
        Ok(FetchResponse { status, body })
    }
}

impl ContentFetcher for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        url: &'a ProbeUrl,
        pin: Option<IpAddr>,
        timeout: Duration,
    ) -> FetchFuture<'a> {
        Box::pin(async move {
            match tokio::time::timeout(timeout, self.fetch_inner(url, pin)).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(%url, ?pin, "probe timed out");
                    Err(CheckFailure::transient(format!(
                        "{}{} timed out after {:.1}s",
                        url,
                        via(pin),
                        timeout.as_secs_f64()
                    )))
                }
            }
        })
    }
}

fn via(pin: Option<IpAddr>) -> String {
    pin.map(|ip| format!(" via {ip}")).unwrap_or_default()
}
