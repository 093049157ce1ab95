//! Command runner: the boundary to the cluster CLI.
//!
//! Probes never build processes themselves; they hand argument lists to a
//! [`CommandRunner`], which tests replace with a scripted fake.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

/// Captured result of one CLI invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a nonzero exit into [`CommandError::Exit`].
    pub fn check(self, args: &[String]) -> Result<Self, CommandError> {
        if self.success() {
            Ok(self)
        } else {
            Err(CommandError::Exit {
                command: display_command(args),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {:.1}s", .timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` exited with {}: {stderr}", .code.map_or_else(|| "signal".to_string(), |c| format!("code {c}")))]
    Exit {
        command: String,
        code: Option<i32>,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    #[error("cannot decode output of `{command}`: {reason}")]
    Decode { command: String, reason: String },
}

/// Boxed future alias for runner results.
pub type CommandFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CommandError>> + Send + 'a>>;

/// Runs cluster CLI commands.
pub trait CommandRunner: Send + Sync {
    /// Run with extra environment variables. A nonzero exit is *not* an error
    /// here; see [`CommandOutput::check`].
    fn run<'a>(&'a self, args: &'a [String], env: &'a [(String, String)]) -> CommandFuture<'a, CommandOutput>;

    /// Run and fail on nonzero exit.
    fn run_checked<'a>(&'a self, args: &'a [String]) -> CommandFuture<'a, CommandOutput> {
        Box::pin(async move { self.run(args, &[]).await?.check(args) })
    }

    /// Run, fail on nonzero exit, and parse stdout as JSON.
    fn capture_json<'a>(&'a self, args: &'a [String]) -> CommandFuture<'a, serde_json::Value> {
        Box::pin(async move { decode_json(args, self.run_checked(args).await?) })
    }

    /// [`run_checked`](Self::run_checked), giving up after `limit`.
    ///
    /// The runner's own timeout still applies; whichever is shorter wins.
    fn run_checked_within<'a>(&'a self, args: &'a [String], limit: Duration) -> CommandFuture<'a, CommandOutput> {
        Box::pin(async move {
            match tokio::time::timeout(limit, self.run_checked(args)).await {
                Ok(result) => result,
                Err(_) => Err(CommandError::Timeout {
                    command: display_command(args),
                    timeout: limit,
                }),
            }
        })
    }

    /// [`capture_json`](Self::capture_json), giving up after `limit`.
    fn capture_json_within<'a>(&'a self, args: &'a [String], limit: Duration) -> CommandFuture<'a, serde_json::Value> {
        Box::pin(async move { decode_json(args, self.run_checked_within(args, limit).await?) })
    }
}

fn decode_json(args: &[String], output: CommandOutput) -> Result<serde_json::Value, CommandError> {
    serde_json::from_str(&output.stdout).map_err(|e| CommandError::Decode {
        command: display_command(args),
        reason: e.to_string(),
    })
}

/// Runs a CLI binary (`oc`, `kubectl`) as a child process.
#[derive(Debug, Clone)]
pub struct CliRunner {
    binary: String,
    base_args: Vec<String>,
    timeout: Duration,
}

impl CliRunner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            base_args: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Arguments placed before every command, e.g. `--kubeconfig=…`.
    pub fn with_base_args(mut self, args: Vec<String>) -> Self {
        self.base_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn full_args(&self, args: &[String]) -> Vec<String> {
        self.base_args.iter().chain(args).cloned().collect()
    }
}

impl CommandRunner for CliRunner {
    fn run<'a>(&'a self, args: &'a [String], env: &'a [(String, String)]) -> CommandFuture<'a, CommandOutput> {
        Box::pin(async move {
            let full = self.full_args(args);
            let command = format!("{} {}", self.binary, display_command(&full));
            debug!(%command, "running command");

            let child = tokio::process::Command::new(&self.binary)
                .args(&full)
                .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| CommandError::Spawn {
                    command: command.clone(),
                    source,
                })?;

            let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
                Ok(result) => result.map_err(|source| CommandError::Spawn {
                    command: command.clone(),
                    source,
                })?,
                Err(_) => {
                    return Err(CommandError::Timeout {
                        command,
                        timeout: self.timeout,
                    });
                }
            };

            let output = CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                code: output.status.code(),
            };
            debug!(%command, code = ?output.code, "command finished");
            Ok(output)
        })
    }
}

/// Arguments joined for messages.
pub fn display_command(args: &[String]) -> String {
    args.join(" ")
}

/// Replace `{name}` in every argument.
pub fn expand_template(template: &[String], name: &str) -> Vec<String> {
    template.iter().map(|arg| arg.replace("{name}", name)).collect()
}
