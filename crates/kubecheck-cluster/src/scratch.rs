//! Scratch resource lifecycle.
//!
//! Every e2e run works inside a disposable namespace named
//! `<prefix>-<unix seconds>-<random hex>`. The manager creates it, tears it
//! down on every exit path, and reaps ones abandoned by crashed runs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use kubecheck_core::config::ScratchConfig;
use kubecheck_core::{ProbeContext, ProbeError, ProbeResult};

use crate::runner::{CommandRunner, expand_template};

/// A scratch resource owned by the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchResource {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A listed scratch resource and how long it has existed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchEntry {
    pub name: String,
    pub age: Duration,
}

pub struct ScratchManager {
    runner: Arc<dyn CommandRunner>,
    config: ScratchConfig,
}

impl ScratchManager {
    pub fn new(runner: Arc<dyn CommandRunner>, config: ScratchConfig) -> Self {
        Self { runner, config }
    }

    pub fn prefix(&self) -> &str {
        &self.config.prefix
    }

    /// A name no concurrent run will pick: creation second plus 32 random bits.
    pub fn unique_name(&self, now: DateTime<Utc>) -> String {
        let mut token = [0u8; 4];
        if getrandom::getrandom(&mut token).is_err() {
            token = now.timestamp_subsec_nanos().to_le_bytes();
        }
        let hex: String = token.iter().map(|b| format!("{b:02x}")).collect();
        format!("{}-{}-{hex}", self.config.prefix, now.timestamp())
    }

    pub async fn create(&self, ctx: &ProbeContext, name: &str) -> ProbeResult<ScratchResource> {
        let args = expand_template(&self.config.create, name);
        self.runner
            .run_checked_within(&args, ctx.remaining())
            .await
            .map_err(|e| ProbeError::Command(format!("cannot create scratch resource {name}: {e}")))?;

        info!(parent: &ctx.span, %name, "scratch resource created");
        Ok(ScratchResource {
            name: name.to_string(),
            created_at: Utc::now(),
        })
    }

    /// Delete `name`. Failures are logged and swallowed; returns whether the
    /// delete command succeeded.
    pub async fn delete(&self, ctx: &ProbeContext, name: &str) -> bool {
        let args = expand_template(&self.config.delete, name);
        match self.runner.run_checked(&args).await {
            Ok(_) => {
                info!(parent: &ctx.span, %name, "scratch resource deleted");
                true
            }
            Err(e) => {
                warn!(parent: &ctx.span, %name, error = %e, "failed to delete scratch resource");
                false
            }
        }
    }

    pub async fn list_with_age(&self, ctx: &ProbeContext) -> ProbeResult<Vec<ScratchEntry>> {
        self.list_with_age_at(ctx, Utc::now()).await
    }

    /// Scratch resources carrying our prefix, aged relative to `now`.
    pub async fn list_with_age_at(&self, ctx: &ProbeContext, now: DateTime<Utc>) -> ProbeResult<Vec<ScratchEntry>> {
        let listing = self
            .runner
            .capture_json(&self.config.list)
            .await
            .map_err(|e| ProbeError::Command(format!("cannot list scratch resources: {e}")))?;

        let items = listing
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut entries = Vec::new();
        for item in items {
            let Some(name) = item.pointer("/metadata/name").and_then(Value::as_str) else {
                continue;
            };
            if !self.owns(name) {
                continue;
            }
            let created = item
                .pointer("/metadata/creationTimestamp")
                .and_then(Value::as_str)
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|ts| ts.with_timezone(&Utc))
                .or_else(|| self.created_from_name(name));
            let Some(created) = created else {
                debug!(parent: &ctx.span, %name, "cannot determine creation time, skipping");
                continue;
            };

            entries.push(ScratchEntry {
                name: name.to_string(),
                age: (now - created).to_std().unwrap_or(Duration::ZERO),
            });
        }
        Ok(entries)
    }

    pub async fn cleanup_older_than(&self, ctx: &ProbeContext, threshold: Duration) -> ProbeResult<usize> {
        self.cleanup_older_than_at(ctx, threshold, Utc::now()).await
    }

    /// Delete every scratch resource older than `threshold`. Returns how many
    /// deletes succeeded.
    pub async fn cleanup_older_than_at(
        &self,
        ctx: &ProbeContext,
        threshold: Duration,
        now: DateTime<Utc>,
    ) -> ProbeResult<usize> {
        let entries = self.list_with_age_at(ctx, now).await?;
        let mut deleted = 0;
        for entry in entries.iter().filter(|e| e.age > threshold) {
            info!(
                parent: &ctx.span,
                name = %entry.name,
                age = entry.age.as_secs(),
                "reaping stale scratch resource"
            );
            if self.delete(ctx, &entry.name).await {
                deleted += 1;
            }
        }
        debug!(parent: &ctx.span, listed = entries.len(), deleted, "stale scratch cleanup done");
        Ok(deleted)
    }

    /// Create a fresh resource, run `body` with it, and delete it afterwards
    /// whatever the body returned. A failed create is also followed by a
    /// delete, since it may have half-succeeded.
    pub async fn scoped<F, Fut, T>(&self, ctx: &ProbeContext, body: F) -> ProbeResult<T>
    where
        F: FnOnce(ScratchResource) -> Fut,
        Fut: Future<Output = ProbeResult<T>>,
    {
        let name = self.unique_name(Utc::now());
        let resource = match self.create(ctx, &name).await {
            Ok(resource) => resource,
            Err(e) => {
                self.delete(ctx, &name).await;
                return Err(e);
            }
        };

        let result = body(resource).await;
        self.delete(ctx, &name).await;
        result
    }

    fn owns(&self, name: &str) -> bool {
        name.strip_prefix(self.config.prefix.as_str())
            .is_some_and(|rest| rest.starts_with('-'))
    }

    fn created_from_name(&self, name: &str) -> Option<DateTime<Utc>> {
        let rest = name.strip_prefix(self.config.prefix.as_str())?.strip_prefix('-')?;
        let secs: i64 = rest.split('-').next()?.parse().ok()?;
        DateTime::from_timestamp(secs, 0)
    }
}
