use std::sync::Arc;

use async_trait::async_trait;

use lisa_core::{
    commands::{Command, CommandContext, CommandMeta},
    scheduler::{ReportSummary, WeeklyReporter},
    Result,
};

/// `/report`: send the weekly digest now (owners only).
pub struct ReportCommand {
    reporter: Arc<WeeklyReporter>,
}

impl ReportCommand {
    pub fn new(reporter: Arc<WeeklyReporter>) -> Self {
        Self { reporter }
    }
}

pub fn render_summary(summary: ReportSummary) -> String {
    if summary.sent == 0 && summary.failed == 0 {
        return "📊 No active groups to report to.".to_string();
    }
    format!(
        "📊 Weekly report sent to {} group(s), {} failed.",
        summary.sent, summary.failed
    )
}

#[async_trait]
impl Command for ReportCommand {
    fn meta(&self) -> CommandMeta {
        CommandMeta::new("report", "Owner", "Send the weekly activity report now")
            .guide("Use /report")
            .owner_only()
    }

    async fn execute(&self, ctx: &CommandContext<'_>, _args: &[String]) -> Result<()> {
        let summary = self.reporter.run_once().await?;
        ctx.reply(&render_summary(summary)).await
    }
}
