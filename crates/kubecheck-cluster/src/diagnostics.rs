//! Best-effort diagnostics for failed runs.
//!
//! Output of the configured commands (events, pod listing, application logs)
//! is attached to the verdict as long-output lines. Nothing here can fail
//! the probe.

use std::sync::Arc;

use tracing::{debug, warn};

use kubecheck_core::ProbeContext;

use crate::runner::{CommandRunner, display_command, expand_template};

/// Lines kept from the end of each command's output.
pub const DEFAULT_MAX_LINES: usize = 20;

pub struct DiagnosticsCollector {
    runner: Arc<dyn CommandRunner>,
    commands: Vec<Vec<String>>,
    max_lines: usize,
}

impl DiagnosticsCollector {
    /// `commands` are argument templates with a `{name}` placeholder.
    pub fn new(runner: Arc<dyn CommandRunner>, commands: Vec<Vec<String>>) -> Self {
        Self {
            runner,
            commands,
            max_lines: DEFAULT_MAX_LINES,
        }
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines;
        self
    }

    /// Run every command against scratch resource `name` and return the
    /// formatted detail lines.
    pub async fn collect(&self, ctx: &ProbeContext, name: &str) -> Vec<String> {
        let mut lines = Vec::new();
        for template in &self.commands {
            let args = expand_template(template, name);
            let command = display_command(&args);
            lines.push(format!("--- {command} ---"));

            match self.runner.run_checked(&args).await {
                Ok(output) => {
                    let text = output.stdout.trim_end();
                    if text.is_empty() {
                        lines.push("(no output)".to_string());
                        continue;
                    }
                    let all: Vec<&str> = text.lines().collect();
                    let skipped = all.len().saturating_sub(self.max_lines);
                    if skipped > 0 {
                        lines.push(format!("({skipped} earlier lines omitted)"));
                    }
                    lines.extend(all[skipped..].iter().map(|l| l.to_string()));
                }
                Err(e) => {
                    warn!(parent: &ctx.span, %command, error = %e, "diagnostic command failed");
                    lines.push(format!("(failed: {e})"));
                }
            }
        }
        debug!(parent: &ctx.span, %name, lines = lines.len(), "diagnostics collected");
        lines
    }
}
