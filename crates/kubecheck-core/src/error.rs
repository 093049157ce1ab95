//! Error taxonomy for probe runs.

use std::time::Duration;

use thiserror::Error;

use crate::severity::Severity;

/// Result type alias for probe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Outcome of one failed attempt.
///
/// The two kinds let callers apply a different retry policy to a content
/// mismatch than to a connection problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckFailure {
    /// Connection refused, timeout, non-2xx, nonzero exit. Worth retrying.
    #[error("{0}")]
    Transient(String),

    /// The endpoint answered but did not serve the expected content.
    #[error("{0}")]
    Validation(String),
}

impl CheckFailure {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(msg) | Self::Validation(msg) => msg,
        }
    }
}

/// Terminal failure of a probe or one of its stages.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Bad URL, unresolvable port, invalid thresholds. Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Hostname resolution failed outright.
    #[error("cannot resolve {host}: {reason}")]
    Resolve { host: String, reason: String },

    /// The deadline ran out while attempts were still failing.
    #[error("{what} failed after {:.1} seconds: {last_failure}", .elapsed.as_secs_f64())]
    Expired {
        what: String,
        elapsed: Duration,
        last_failure: String,
    },

    /// Content mismatch under the abort policy.
    #[error("{what}: {reason}")]
    Validation { what: String, reason: String },

    /// Not every resolved address served the expected content in time.
    #[error(
        "{url} not available via all addresses after {:.1} seconds ({})",
        .elapsed.as_secs_f64(),
        .failing.join(", ")
    )]
    Unavailable {
        url: String,
        elapsed: Duration,
        /// `address: reason` for each address still failing.
        failing: Vec<String>,
    },

    /// A cluster CLI call failed in a way that ends the probe.
    #[error("{0}")]
    Command(String),
}

impl ProbeError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Severity this failure contributes to the verdict.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Config(_) => Severity::Unknown,
            _ => Severity::Critical,
        }
    }
}
