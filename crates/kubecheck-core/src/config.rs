//! kubecheck.toml configuration parser.
//!
//! Every table and key is optional; command-line flags override what the
//! file sets.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffConfig;
use crate::verdict::Thresholds;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub thresholds: Thresholds,
    pub http: HttpConfig,
    pub backoff: BackoffConfig,
    pub cli: CliConfig,
    pub scratch: ScratchConfig,
    pub e2e: E2eConfig,
}

/// What to do when an endpoint answers without the expected content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Treat a mismatch like any transient failure and retry until the deadline.
    #[default]
    Retry,
    /// Fail the probe on the first mismatch.
    Abort,
}

impl std::str::FromStr for ValidationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retry" => Ok(Self::Retry),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown mismatch policy `{other}` (expected retry or abort)")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Regex the response body must match.
    pub pattern: String,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    pub on_mismatch: ValidationPolicy,
    /// Per-attempt timeout of the single-target poller.
    #[serde(with = "secs_f64")]
    pub attempt_timeout: Duration,
    /// Lower bound of the per-address attempt timeout.
    #[serde(with = "secs_f64")]
    pub address_timeout_min: Duration,
    /// Upper bound of the per-address attempt timeout.
    #[serde(with = "secs_f64")]
    pub address_timeout_max: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            pattern: String::from("."),
            insecure: false,
            on_mismatch: ValidationPolicy::Retry,
            attempt_timeout: Duration::from_secs(10),
            address_timeout_min: Duration::from_secs(10),
            address_timeout_max: Duration::from_secs(300),
        }
    }
}

/// How the cluster CLI is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub binary: String,
    /// Arguments prepended to every call, e.g. `--kubeconfig=…`.
    pub args: Vec<String>,
    #[serde(with = "secs_f64")]
    pub command_timeout: Duration,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            binary: String::from("oc"),
            args: Vec::new(),
            command_timeout: Duration::from_secs(60),
        }
    }
}

/// Argument templates for scratch resource lifecycle. `{name}` is replaced
/// with the resource name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    pub prefix: String,
    pub create: Vec<String>,
    pub delete: Vec<String>,
    pub list: Vec<String>,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            prefix: String::from("kubecheck-e2e"),
            create: vec!["new-project".into(), "{name}".into()],
            delete: vec![
                "delete".into(),
                "project".into(),
                "{name}".into(),
                "--wait=false".into(),
            ],
            list: vec!["get".into(), "projects".into(), "-o".into(), "json".into()],
        }
    }
}

/// The end-to-end deployment exercised inside the scratch resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    /// Commands run inside the scratch namespace, in order.
    pub deploy: Vec<Vec<String>>,
    /// Route whose `spec.host` is probed.
    pub route: String,
    /// URL template; `{host}` is the route host, `{name}` the scratch name.
    pub url: String,
    /// Collect events and logs when the probe fails.
    pub diagnostics: bool,
    /// Commands whose output is attached to a failed verdict; `{name}` is
    /// the scratch name.
    pub diagnostic_commands: Vec<Vec<String>>,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            deploy: vec![
                vec![
                    "new-app".into(),
                    "--name=kubecheck".into(),
                    "--image=registry.access.redhat.com/ubi9/httpd-24".into(),
                ],
                vec!["expose".into(), "service/kubecheck".into()],
            ],
            route: String::from("kubecheck"),
            url: String::from("http://{host}/"),
            diagnostics: true,
            diagnostic_commands: vec![
                vec![
                    "get".into(),
                    "events".into(),
                    "-n".into(),
                    "{name}".into(),
                    "--sort-by=.lastTimestamp".into(),
                ],
                vec!["get".into(), "pods".into(), "-n".into(), "{name}".into(), "-o".into(), "wide".into()],
                vec![
                    "logs".into(),
                    "-n".into(),
                    "{name}".into(),
                    "deployment/kubecheck".into(),
                    "--tail=20".into(),
                ],
            ],
        }
    }
}

impl ProbeConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ProbeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Serde adapter storing a `Duration` as (fractional) seconds.
pub mod secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|e| {
            serde::de::Error::custom(format!("invalid duration {secs}: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_uses_defaults() {
        let config: ProbeConfig = toml::from_str("").unwrap();
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.cli.binary, "oc");
        assert_eq!(config.http.on_mismatch, ValidationPolicy::Retry);
        assert_eq!(config.scratch.create, vec!["new-project", "{name}"]);
    }

    #[test]
    fn parse_overrides() {
        let toml_str = r#"
[thresholds]
warning = 60
critical = 120.5

[http]
pattern = "Hello, world"
insecure = true
on_mismatch = "abort"

[backoff]
min = 0.5
max = 10

[e2e]
route = "hello"
url = "https://{host}/healthz"
deploy = [["create", "-f", "app.yaml"]]
"#;
        let config: ProbeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.thresholds.warning, Duration::from_secs(60));
        assert_eq!(config.thresholds.critical, Duration::from_millis(120_500));
        assert_eq!(config.http.pattern, "Hello, world");
        assert!(config.http.insecure);
        assert_eq!(config.http.on_mismatch, ValidationPolicy::Abort);
        assert_eq!(config.backoff.min, Duration::from_millis(500));
        assert_eq!(config.e2e.deploy.len(), 1);
        // Untouched keys keep defaults.
        assert_eq!(config.http.address_timeout_max, Duration::from_secs(300));
        assert!(config.e2e.diagnostics);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let err = toml::from_str::<ProbeConfig>("[thresholds]\nwarning = -1\ncritical = 5\n")
            .unwrap_err();
        assert!(err.to_string().contains("invalid duration"));
    }

    #[test]
    fn from_file_roundtrips_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubecheck.toml");
        std::fs::write(&path, ProbeConfig::default().to_toml_string().unwrap()).unwrap();

        let config = ProbeConfig::from_file(&path).unwrap();
        assert_eq!(config.e2e.route, "kubecheck");
        assert_eq!(config.backoff, BackoffConfig::default());
    }

    #[test]
    fn sample_config_parses() {
        let config: ProbeConfig = toml::from_str(include_str!("../../../demos/kubecheck.toml")).unwrap();
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.cli.args, vec!["--request-timeout=30s"]);
        assert_eq!(config.e2e.deploy.len(), 2);
        assert_eq!(config.e2e.diagnostic_commands.len(), 2);
    }

    #[test]
    fn mismatch_policy_from_str() {
        assert_eq!("Abort".parse::<ValidationPolicy>(), Ok(ValidationPolicy::Abort));
        assert!("sometimes".parse::<ValidationPolicy>().is_err());
    }
}
