//! Scripted [`CommandRunner`] for tests.
//!
//! Replies are matched by argument prefix; the first matching rule answers.
//! A rule with several queued replies hands them out in order and then keeps
//! repeating the last one. Unmatched commands succeed with empty output.
//! [`stall`](ScriptedRunner::stall) makes matching commands take a while
//! before they answer, on tokio's clock.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::runner::{CommandFuture, CommandOutput, CommandRunner};

struct Rule {
    prefix: Vec<String>,
    replies: VecDeque<CommandOutput>,
}

#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    stalls: Mutex<Vec<(Vec<String>, Duration)>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `output` for commands starting with `prefix`.
    pub fn on(self, prefix: &[&str], output: CommandOutput) -> Self {
        {
            let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
            let prefix: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
            match rules.iter_mut().find(|r| r.prefix == prefix) {
                Some(rule) => rule.replies.push_back(output),
                None => rules.push(Rule {
                    prefix,
                    replies: VecDeque::from([output]),
                }),
            }
        }
        self
    }

    pub fn on_stdout(self, prefix: &[&str], stdout: &str) -> Self {
        self.on(
            prefix,
            CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                code: Some(0),
            },
        )
    }

    pub fn on_failure(self, prefix: &[&str], stderr: &str) -> Self {
        self.on(
            prefix,
            CommandOutput {
                stdout: String::new(),
                stderr: stderr.to_string(),
                code: Some(1),
            },
        )
    }

    /// Commands starting with `prefix` sleep for `delay` before replying.
    pub fn stall(self, prefix: &[&str], delay: Duration) -> Self {
        self.stalls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((prefix.iter().map(|s| s.to_string()).collect(), delay));
        self
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// How many commands started with `prefix`.
    pub fn count(&self, prefix: &[&str]) -> usize {
        self.calls()
            .iter()
            .filter(|call| starts_with(call, prefix))
            .count()
    }
}

fn starts_with(args: &[String], prefix: &[impl AsRef<str>]) -> bool {
    args.len() >= prefix.len() && args.iter().zip(prefix).all(|(a, p)| a == p.as_ref())
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, args: &'a [String], _env: &'a [(String, String)]) -> CommandFuture<'a, CommandOutput> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(args.to_vec());

            let stall = self
                .stalls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .find(|(prefix, _)| starts_with(args, prefix))
                .map(|(_, delay)| *delay);
            if let Some(delay) = stall {
                tokio::time::sleep(delay).await;
            }

            let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
            let reply = rules
                .iter_mut()
                .find(|rule| starts_with(args, &rule.prefix))
                .and_then(|rule| {
                    if rule.replies.len() > 1 {
                        rule.replies.pop_front()
                    } else {
                        rule.replies.front().cloned()
                    }
                });

            Ok(reply.unwrap_or(CommandOutput {
                code: Some(0),
                ..CommandOutput::default()
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn replies_in_order_then_repeats_last() {
        let runner = ScriptedRunner::new()
            .on_failure(&["get", "route"], "not found")
            .on_stdout(&["get", "route"], "{}");

        let cmd = args(&["get", "route", "app", "-o", "json"]);
        assert!(!runner.run(&cmd, &[]).await.unwrap().success());
        assert!(runner.run(&cmd, &[]).await.unwrap().success());
        assert!(runner.run(&cmd, &[]).await.unwrap().success());
        assert_eq!(runner.count(&["get", "route"]), 3);
    }

    #[tokio::test]
    async fn unmatched_commands_succeed() {
        let runner = ScriptedRunner::new();
        let output = runner.run(&args(&["whoami"]), &[]).await.unwrap();
        assert!(output.success());
        assert_eq!(runner.calls(), vec![args(&["whoami"])]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_commands_reply_late() {
        let runner = ScriptedRunner::new()
            .stall(&["rollout", "status"], Duration::from_secs(90))
            .on_stdout(&["rollout", "status"], "successfully rolled out");
        let start = tokio::time::Instant::now();

        let output = runner
            .run(&args(&["rollout", "status", "deployment/app"]), &[])
            .await
            .unwrap();
        assert_eq!(output.stdout, "successfully rolled out");
        assert_eq!(start.elapsed(), Duration::from_secs(90));

        runner.run(&args(&["whoami"]), &[]).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(90));
    }
}
