//! Audit command: reconcile a published release with the matrix.

use crate::audit::{AuditReport, audit_release};

use super::context::CommandContext;

#[derive(Debug)]
pub struct AuditCommand {
    ctx: CommandContext,
}

impl AuditCommand {
    pub fn new(ctx: CommandContext) -> Self {
        Self { ctx }
    }

    pub fn execute(&self, tag: &str) -> anyhow::Result<AuditReport> {
        let host = self.ctx.github_host()?;
        let config = self.ctx.config();

        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| anyhow::anyhow!("Failed to create tokio runtime: {}", e))?;

        let report = runtime.block_on(audit_release(
            &host,
            tag,
            config.artifacts.format,
            config.retry,
        ))?;
        Ok(report)
    }
}
