//! Final verdict and performance data in the monitoring-plugin format.
//!
//! A verdict is assembled once, at the end of a probe, from sub-check
//! failures and measured durations:
//!
//! ```text
//! CRITICAL: route not ready; 10.0.0.2: connection refused | time=31.2s;300;900;0
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::secs_f64;
use crate::error::{ProbeError, ProbeResult};
use crate::severity::Severity;

/// Delimiter between failure descriptions in the summary line.
pub const MESSAGE_DELIMITER: &str = "; ";

/// Warning and critical duration thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(with = "secs_f64")]
    pub warning: Duration,
    #[serde(with = "secs_f64")]
    pub critical: Duration,
}

impl Thresholds {
    /// Build thresholds, rejecting `critical < warning`.
    pub fn new(warning: Duration, critical: Duration) -> ProbeResult<Self> {
        let thresholds = Self { warning, critical };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> ProbeResult<()> {
        if self.critical < self.warning {
            return Err(ProbeError::config(format!(
                "critical threshold ({}s) must be greater than or equal to warning threshold ({}s)",
                self.critical.as_secs_f64(),
                self.warning.as_secs_f64()
            )));
        }
        if self.critical.is_zero() {
            return Err(ProbeError::config("critical threshold must be positive"));
        }
        Ok(())
    }

    /// Severity earned by a successful run of the given duration.
    ///
    /// Duration alone tops out at `Warning`: the critical threshold is the
    /// run's deadline, so anything slower already failed with an expiry.
    pub fn classify(&self, duration: Duration) -> Severity {
        if duration >= self.warning {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning: Duration::from_secs(300),
            critical: Duration::from_secs(900),
        }
    }
}

/// One performance metric: `label=value[unit];warn;crit;min[;max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub label: String,
    pub value: f64,
    pub unit: &'static str,
    pub warn: Option<f64>,
    pub crit: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Metric {
    /// A duration metric in seconds, annotated with the thresholds.
    pub fn duration(label: impl Into<String>, elapsed: Duration, thresholds: &Thresholds) -> Self {
        Self {
            label: label.into(),
            value: elapsed.as_secs_f64(),
            unit: "s",
            warn: Some(thresholds.warning.as_secs_f64()),
            crit: Some(thresholds.critical.as_secs_f64()),
            min: Some(0.0),
            max: None,
        }
    }

    /// A unitless counter with no thresholds.
    pub fn count(label: impl Into<String>, value: u64) -> Self {
        Self {
            label: label.into(),
            value: value as f64,
            unit: "",
            warn: None,
            crit: None,
            min: Some(0.0),
            max: None,
        }
    }
}

fn fmt_number(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    format!("{rounded}")
}

fn fmt_optional(value: Option<f64>) -> String {
    value.map(fmt_number).unwrap_or_default()
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.label.contains([' ', '=', '\'']) {
            write!(f, "'{}'", self.label.replace('\'', "''"))?;
        } else {
            f.write_str(&self.label)?;
        }
        write!(
            f,
            "={}{};{};{};{}",
            fmt_number(self.value),
            self.unit,
            fmt_optional(self.warn),
            fmt_optional(self.crit),
            fmt_optional(self.min),
        )?;
        if let Some(max) = self.max {
            write!(f, ";{}", fmt_number(max))?;
        }
        Ok(())
    }
}

/// The single output of a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub severity: Severity,
    /// Joined failure descriptions. Empty when everything passed.
    pub message: String,
    /// Summary printed when `message` is empty.
    pub summary: String,
    pub metrics: Vec<Metric>,
    /// Extra lines printed after the status line (diagnostics).
    pub details: Vec<String>,
}

impl Verdict {
    /// The status line: `STATUS: text | metrics`.
    pub fn status_line(&self) -> String {
        let text = if self.message.is_empty() {
            &self.summary
        } else {
            &self.message
        };
        let mut line = format!("{}: {}", self.severity, text);
        if !self.metrics.is_empty() {
            let perf: Vec<String> = self.metrics.iter().map(Metric::to_string).collect();
            line.push_str(" | ");
            line.push_str(&perf.join(" "));
        }
        line
    }

    /// Status line followed by detail lines, newline-terminated.
    pub fn render(&self) -> String {
        let mut out = self.status_line();
        out.push('\n');
        for line in &self.details {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    pub fn exit_code(&self) -> i32 {
        self.severity.exit_code()
    }
}

/// Accumulates sub-check results into a [`Verdict`].
#[derive(Debug, Default)]
pub struct VerdictBuilder {
    severity: Severity,
    failures: Vec<String>,
    metrics: Vec<Metric>,
    details: Vec<String>,
}

impl VerdictBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed sub-check.
    pub fn fail(&mut self, severity: Severity, description: impl Into<String>) -> &mut Self {
        self.severity = self.severity.merge(severity);
        self.failures.push(description.into());
        self
    }

    /// Record a terminal probe error at its own severity.
    pub fn error(&mut self, err: &ProbeError) -> &mut Self {
        self.fail(err.severity(), err.to_string())
    }

    /// Record a measured duration and classify it against the thresholds.
    pub fn duration(
        &mut self,
        label: &str,
        elapsed: Duration,
        thresholds: &Thresholds,
    ) -> &mut Self {
        self.metrics.push(Metric::duration(label, elapsed, thresholds));
        let level = thresholds.classify(elapsed);
        if level > Severity::Ok {
            self.fail(
                level,
                format!(
                    "{label} took {:.1}s (warning at {}s)",
                    elapsed.as_secs_f64(),
                    thresholds.warning.as_secs_f64()
                ),
            );
        }
        self
    }

    pub fn metric(&mut self, metric: Metric) -> &mut Self {
        self.metrics.push(metric);
        self
    }

    pub fn detail(&mut self, line: impl Into<String>) -> &mut Self {
        self.details.push(line.into());
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Produce the verdict. `summary` is shown only when nothing failed.
    pub fn finish(self, summary: impl Into<String>) -> Verdict {
        Verdict {
            severity: self.severity,
            message: self.failures.join(MESSAGE_DELIMITER),
            summary: summary.into(),
            metrics: self.metrics,
            details: self.details,
        }
    }
}
