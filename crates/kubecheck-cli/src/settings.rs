//! Effective configuration: kubecheck.toml overlaid with command-line flags.

use std::time::Duration;

use anyhow::Context;

use kubecheck_core::ProbeConfig;

use crate::CommonArgs;

/// Clap value parser for durations given in (fractional) seconds.
pub fn parse_secs(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("`{raw}` is not a number of seconds"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration `{raw}`: {e}"))
}

/// Load the config file (if any), apply flag overrides and validate.
pub fn load(args: &CommonArgs) -> anyhow::Result<ProbeConfig> {
    let mut config = match &args.config {
        Some(path) => ProbeConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ProbeConfig::default(),
    };

    if let Some(warning) = args.warning {
        config.thresholds.warning = warning;
    }
    if let Some(critical) = args.critical {
        config.thresholds.critical = critical;
    }
    if let Some(pattern) = &args.pattern {
        config.http.pattern = pattern.clone();
    }
    if args.insecure {
        config.http.insecure = true;
    }
    if let Some(policy) = args.on_mismatch {
        config.http.on_mismatch = policy;
    }
    if let Some(kubeconfig) = &args.kubeconfig {
        config.cli.args.push(format!("--kubeconfig={}", kubeconfig.display()));
    }

    config.thresholds.validate()?;
    Ok(config)
}
