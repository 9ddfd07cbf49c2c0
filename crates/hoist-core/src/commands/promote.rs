//! Promote command: run one promotion job against the configured host.

use anyhow::Context;

use crate::job::{CancelFlag, JobOutcome, PromotionJob, TagEvent};
use crate::release::ReleaseHost;

use super::context::CommandContext;

/// Options for the promote command
#[derive(Debug, Clone, Default)]
pub struct PromoteOptions {
    /// Tag to promote; read from the CI environment when `from_env` is set
    pub tag: Option<String>,
    pub from_env: bool,
    /// Commit the tag points at
    pub reference: Option<String>,
}

impl PromoteOptions {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        Self {
            from_env: true,
            ..Self::default()
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Resolve the tag event, consulting `lookup` for CI variables.
    pub fn resolve_event<F>(&self, lookup: F) -> anyhow::Result<TagEvent>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tag = match (&self.tag, self.from_env) {
            (Some(tag), _) => tag.clone(),
            (None, true) => tag_from_env(&lookup)?,
            (None, false) => anyhow::bail!("No tag given. Pass a tag or use --from-env"),
        };
        let reference = self.reference.clone().or_else(|| {
            self.from_env
                .then(|| lookup("GITHUB_SHA"))
                .flatten()
                .filter(|sha| !sha.is_empty())
        });

        let mut event = TagEvent::new(tag);
        event.reference = reference;
        Ok(event)
    }
}

fn tag_from_env<F>(lookup: &F) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(name) = lookup("GITHUB_REF_NAME").filter(|n| !n.is_empty()) {
        return Ok(name);
    }
    match lookup("GITHUB_REF") {
        Some(reference) => reference
            .strip_prefix("refs/tags/")
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("GITHUB_REF '{}' is not a tag ref", reference)),
        None => anyhow::bail!("Neither GITHUB_REF_NAME nor GITHUB_REF is set"),
    }
}

#[derive(Debug)]
pub struct PromoteCommand {
    ctx: CommandContext,
}

impl PromoteCommand {
    pub fn new(ctx: CommandContext) -> Self {
        Self { ctx }
    }

    /// Run the job on a fresh runtime. Ctrl-C cancels it between states.
    pub fn execute(&self, options: &PromoteOptions) -> anyhow::Result<JobOutcome> {
        let event = options.resolve_event(|key| std::env::var(key).ok())?;
        let host = self.ctx.github_host()?;

        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| anyhow::anyhow!("Failed to create tokio runtime: {}", e))?;

        let cancel = CancelFlag::new();
        let on_interrupt = cancel.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling after the current step");
                on_interrupt.cancel();
            }
        });

        runtime.block_on(self.run(&host, &event, cancel))
    }

    /// Run the job against `host`.
    pub async fn run<H: ReleaseHost + ?Sized>(
        &self,
        host: &H,
        event: &TagEvent,
        cancel: CancelFlag,
    ) -> anyhow::Result<JobOutcome> {
        let config = self.ctx.config();
        let rules = config.tag_rules().context("Invalid tag patterns")?;
        let mut job =
            PromotionJob::new(host, rules, config.job_options()).with_cancel_flag(cancel);
        Ok(job.run(event).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn explicit_tag_wins() {
        let event = PromoteOptions::tag("v1.0.0")
            .resolve_event(env(&[("GITHUB_REF_NAME", "v9.9.9")]))
            .unwrap();
        assert_eq!(event.tag, "v1.0.0");
        assert_eq!(event.reference, None);
    }

    #[test]
    fn reads_ref_name_and_sha_from_env() {
        let event = PromoteOptions::from_env()
            .resolve_event(env(&[("GITHUB_REF_NAME", "v1.2.0"), ("GITHUB_SHA", "abc123")]))
            .unwrap();
        assert_eq!(event.tag, "v1.2.0");
        assert_eq!(event.reference.as_deref(), Some("abc123"));
    }

    #[test]
    fn falls_back_to_full_ref() {
        let event = PromoteOptions::from_env()
            .resolve_event(env(&[("GITHUB_REF", "refs/tags/v1.2.0")]))
            .unwrap();
        assert_eq!(event.tag, "v1.2.0");

        let err = PromoteOptions::from_env()
            .resolve_event(env(&[("GITHUB_REF", "refs/heads/main")]))
            .unwrap_err();
        assert!(err.to_string().contains("not a tag ref"));
    }

    #[test]
    fn missing_tag_is_an_error() {
        assert!(PromoteOptions::default().resolve_event(env(&[])).is_err());
        assert!(PromoteOptions::from_env().resolve_event(env(&[])).is_err());
    }

    #[test]
    fn explicit_reference_is_kept() {
        let event = PromoteOptions::tag("v1.0.0")
            .with_reference("deadbeef")
            .resolve_event(env(&[]))
            .unwrap();
        assert_eq!(event.reference.as_deref(), Some("deadbeef"));
    }
}
