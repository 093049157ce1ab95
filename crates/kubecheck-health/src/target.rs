//! What a probe fetches and how the response is judged.

use std::fmt;
use std::time::Duration;

use http::Uri;
use regex::Regex;

use kubecheck_core::{CheckFailure, ProbeError, ProbeResult};

use crate::fetch::FetchResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

/// A parsed probe URL with its port already determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeUrl {
    raw: String,
    scheme: Scheme,
    /// Hostname or IP literal without brackets.
    host: String,
    port: u16,
    /// Value for the `Host` header.
    authority: String,
    /// Origin-form request target (`/path?query`).
    path: String,
}

impl ProbeUrl {
    /// Parse an `http://` or `https://` URL.
    ///
    /// Anything whose port cannot be determined is a configuration error.
    pub fn parse(raw: &str) -> ProbeResult<Self> {
        let uri: Uri = raw
            .parse()
            .map_err(|e| ProbeError::config(format!("invalid URL `{raw}`: {e}")))?;

        let scheme = match uri.scheme_str() {
            Some("http") => Scheme::Http,
            Some("https") => Scheme::Https,
            Some(other) => {
                return Err(ProbeError::config(format!(
                    "cannot determine port for `{raw}`: unsupported scheme `{other}`"
                )));
            }
            None => {
                return Err(ProbeError::config(format!(
                    "cannot determine port for `{raw}`: URL has no scheme"
                )));
            }
        };

        let authority = uri
            .authority()
            .ok_or_else(|| ProbeError::config(format!("URL `{raw}` has no host")))?;
        let host = authority
            .host()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        if host.is_empty() {
            return Err(ProbeError::config(format!("URL `{raw}` has no host")));
        }

        let port = uri.port_u16().unwrap_or(match scheme {
            Scheme::Http => 80,
            Scheme::Https => 443,
        });

        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/")
            .to_string();

        Ok(Self {
            raw: raw.to_string(),
            scheme,
            host,
            port,
            authority: authority.as_str().to_string(),
            path,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for ProbeUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// URL, required body pattern, and per-attempt timeout.
#[derive(Debug, Clone)]
pub struct CheckTarget {
    pub url: ProbeUrl,
    pub pattern: Regex,
    pub timeout: Duration,
}

impl CheckTarget {
    pub fn new(url: &str, pattern: &str, timeout: Duration) -> ProbeResult<Self> {
        let url = ProbeUrl::parse(url)?;
        let pattern = Regex::new(pattern)
            .map_err(|e| ProbeError::config(format!("invalid content pattern `{pattern}`: {e}")))?;
        Ok(Self {
            url,
            pattern,
            timeout,
        })
    }

    /// Accept a 2xx response whose body matches the pattern.
    ///
    /// A non-2xx status is transient; a 2xx without the pattern is a
    /// validation failure.
    pub fn validate(&self, response: &FetchResponse) -> Result<(), CheckFailure> {
        if !response.status.is_success() {
            return Err(CheckFailure::transient(format!(
                "HTTP {} from {}",
                response.status, self.url
            )));
        }
        let body = String::from_utf8_lossy(&response.body);
        if !self.pattern.is_match(&body) {
            return Err(CheckFailure::validation(format!(
                "pattern `{}` not found in response from {}",
                self.pattern, self.url
            )));
        }
        Ok(())
    }
}
