//! kubecheck-core — building blocks shared by every cluster probe.
//!
//! - [`Deadline`]: the wall-clock budget of one probe run
//! - [`Backoff`]: doubling, capped delays between retries
//! - [`Severity`]: OK < WARNING < CRITICAL < UNKNOWN with worst-wins merge
//! - [`VerdictBuilder`] / [`Verdict`]: the status line, message and perfdata
//! - [`ProbeError`] / [`CheckFailure`]: terminal vs. per-attempt failures
//! - [`ProbeConfig`]: kubecheck.toml

pub mod backoff;
pub mod config;
pub mod context;
pub mod deadline;
pub mod error;
pub mod severity;
pub mod verdict;

pub use backoff::{Backoff, BackoffConfig};
pub use config::{ProbeConfig, ValidationPolicy};
pub use context::ProbeContext;
pub use deadline::Deadline;
pub use error::{CheckFailure, ProbeError, ProbeResult};
pub use severity::Severity;
pub use verdict::{Metric, Thresholds, Verdict, VerdictBuilder};
