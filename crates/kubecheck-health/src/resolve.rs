//! Hostname resolution for multi-address checks.
//!
//! Resolution goes through two links:
//! 1. **Overrides** — static `host → addresses` entries (`--resolve`)
//! 2. **Host system DNS** — via `tokio::net::lookup_host`
//!
//! Unlike a normal client, the caller wants *every* address, not the first
//! one that connects.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::pin::Pin;

use tracing::debug;

/// Boxed future alias for resolution results.
pub type ResolveFuture<'a> = Pin<Box<dyn Future<Output = io::Result<Vec<IpAddr>>> + Send + 'a>>;

/// Resolves a hostname to all of its stream-capable addresses.
pub trait Resolver: Send + Sync {
    fn resolve<'a>(&'a self, host: &'a str, port: u16) -> ResolveFuture<'a>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => f.write_str("ipv4"),
            Self::V6 => f.write_str("ipv6"),
        }
    }
}

/// System resolver with optional static overrides.
#[derive(Debug, Clone, Default)]
pub struct SystemResolver {
    overrides: HashMap<String, Vec<IpAddr>>,
}

impl SystemResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `host` with `addresses` instead of asking DNS.
    pub fn with_override(mut self, host: &str, addresses: Vec<IpAddr>) -> Self {
        self.overrides
            .entry(host.to_lowercase())
            .or_default()
            .extend(addresses);
        self
    }

    /// Parse a curl-style `host:addr[,addr…]` override.
    pub fn parse_override(spec: &str) -> Result<(String, Vec<IpAddr>), String> {
        let (host, addrs) = spec
            .split_once(':')
            .ok_or_else(|| format!("invalid resolve override `{spec}` (expected host:addr[,addr])"))?;
        if host.is_empty() {
            return Err(format!("invalid resolve override `{spec}`: empty host"));
        }
        let addresses = addrs
            .split(',')
            .map(|a| {
                a.trim()
                    .trim_start_matches('[')
                    .trim_end_matches(']')
                    .parse::<IpAddr>()
                    .map_err(|e| format!("invalid address `{a}` in `{spec}`: {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((host.to_string(), addresses))
    }
}

impl Resolver for SystemResolver {
    fn resolve<'a>(&'a self, host: &'a str, port: u16) -> ResolveFuture<'a> {
        Box::pin(async move {
            if let Some(addresses) = self.overrides.get(&host.to_lowercase()) {
                debug!(%host, count = addresses.len(), "resolved from overrides");
                return Ok(addresses.clone());
            }

            if let Ok(ip) = host.parse::<IpAddr>() {
                return Ok(vec![ip]);
            }

            let addresses: Vec<IpAddr> = tokio::net::lookup_host((host, port))
                .await?
                .map(|sa| sa.ip())
                .collect();
            debug!(%host, count = addresses.len(), "resolved via system DNS");
            Ok(addresses)
        })
    }
}

/// Drop repeated addresses, keeping first-seen order.
pub fn dedup_addresses(addresses: Vec<IpAddr>) -> Vec<IpAddr> {
    let mut seen = std::collections::HashSet::new();
    addresses.into_iter().filter(|a| seen.insert(*a)).collect()
}
