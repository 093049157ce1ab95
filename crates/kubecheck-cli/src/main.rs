//! kubecheck — end-to-end cluster health probe.
//!
//! Runs one probe, prints a monitoring-plugin verdict and exits with its
//! status code (0 OK, 1 WARNING, 2 CRITICAL, 3 UNKNOWN).
//!
//! # Usage
//!
//! ```text
//! kubecheck e2e --warning 300 --critical 900 --insecure
//! kubecheck url https://console.apps.example.com/ --pattern 'OpenShift'
//! kubecheck cleanup --older-than 3600
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::info_span;

use kubecheck_cluster::{CliRunner, CommandRunner};
use kubecheck_core::{
    Deadline, ProbeContext, ProbeError, Severity, ValidationPolicy, Verdict, VerdictBuilder,
};

mod commands;
mod output;
mod settings;

#[derive(Parser)]
#[command(
    name = "kubecheck",
    about = "End-to-end cluster health probe with monitoring-plugin output",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Default, Args)]
pub struct CommonArgs {
    /// Path to kubecheck.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Duration in seconds after which the result is at least WARNING.
    #[arg(short, long, global = true, value_parser = settings::parse_secs)]
    pub warning: Option<Duration>,

    /// Run budget in seconds; not finishing in time is CRITICAL.
    #[arg(short, long, global = true, value_parser = settings::parse_secs)]
    pub critical: Option<Duration>,

    /// Write the verdict to this file instead of stdout.
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Regex the response body must match.
    #[arg(short, long, global = true)]
    pub pattern: Option<String>,

    /// Skip TLS certificate verification.
    #[arg(short = 'k', long, global = true)]
    pub insecure: bool,

    /// What to do when an endpoint answers with unexpected content.
    #[arg(long, global = true, value_name = "retry|abort")]
    pub on_mismatch: Option<ValidationPolicy>,

    /// Pin a hostname to fixed addresses: `host:addr[,addr]`. Repeatable.
    #[arg(long, global = true)]
    pub resolve: Vec<String>,

    /// Kubeconfig passed to every cluster CLI call.
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy a test application in a scratch project and probe its route.
    E2e,
    /// Probe a fixed URL through every address its host resolves to.
    Url {
        /// URL to probe.
        url: String,
    },
    /// Delete scratch projects left behind by earlier runs.
    Cleanup {
        /// Age in seconds above which scratch projects are removed
        /// (default: twice the critical threshold).
        #[arg(long, value_parser = settings::parse_secs)]
        older_than: Option<Duration>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,kubecheck=debug")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let first = e.to_string().lines().next().unwrap_or_default().to_string();
            let verdict = unknown(first.trim_start_matches("error: "));
            std::process::exit(output::emit(&verdict, None));
        }
    };

    let verdict = run(&cli).await;
    std::process::exit(output::emit(&verdict, cli.common.output.as_deref()));
}

async fn run(cli: &Cli) -> Verdict {
    let config = match settings::load(&cli.common) {
        Ok(config) => config,
        Err(e) => return unknown(&format!("{e:#}")),
    };

    let kind = match &cli.command {
        Command::E2e => "e2e",
        Command::Url { .. } => "url",
        Command::Cleanup { .. } => "cleanup",
    };
    let span = info_span!("probe", kind);
    let ctx = ProbeContext::new(Deadline::new(config.thresholds.critical), span);

    let runner: Arc<dyn CommandRunner> = Arc::new(
        CliRunner::new(config.cli.binary.clone())
            .with_base_args(config.cli.args.clone())
            .with_timeout(config.cli.command_timeout),
    );

    match &cli.command {
        Command::E2e => match commands::HttpProbe::from_config(&config, &cli.common.resolve) {
            Ok(http) => commands::e2e::run(&ctx, &config, runner, &http).await,
            Err(e) => failed(&e),
        },
        Command::Url { url } => match commands::HttpProbe::from_config(&config, &cli.common.resolve) {
            Ok(http) => commands::url::run(&ctx, &config, &http, url).await,
            Err(e) => failed(&e),
        },
        Command::Cleanup { older_than } => {
            let threshold = older_than.unwrap_or(config.thresholds.critical * 2);
            commands::cleanup::run(&ctx, runner, &config, threshold).await
        }
    }
}

fn failed(err: &ProbeError) -> Verdict {
    let mut verdict = VerdictBuilder::new();
    verdict.error(err);
    verdict.finish("")
}

/// Verdict for a run that could not start.
fn unknown(message: &str) -> Verdict {
    let mut verdict = VerdictBuilder::new();
    verdict.fail(Severity::Unknown, message);
    verdict.finish("")
}
