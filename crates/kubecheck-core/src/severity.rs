//! Ordered status levels shared by every probe.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result level of a probe, in the monitoring-plugin convention.
///
/// Variants are declared in merge order, so the derived `Ord` is the
/// worst-wins order used by [`Severity::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Severity {
    /// Worst of the two levels. `Ok` is the identity.
    pub fn merge(self, other: Severity) -> Severity {
        self.max(other)
    }

    /// Process exit code for this level.
    pub fn exit_code(self) -> i32 {
        match self {
            Severity::Ok => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
            Severity::Unknown => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
            Severity::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
