//! Retry command - return `failed` items to `pending`

use anyhow::Result;
use clap::Args;

use super::ClassArgs;
use crate::context::AppContext;
use crate::output::{OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct RetryCommand {
    #[command(flatten)]
    pub class: ClassArgs,
}

impl RetryCommand {
    pub async fn execute(
        &self,
        ctx: &AppContext,
        format: OutputFormat,
        fmt: &dyn OutputFormatter,
    ) -> Result<()> {
        let requeued = ctx
            .local_engine()
            .retry_failed(self.class.media_class())
            .await?;

        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({ "requeued": requeued }));
        } else if requeued == 0 {
            fmt.info("No failed items to retry");
        } else {
            fmt.success(&format!("{requeued} failed item(s) returned to pending"));
        }
        Ok(())
    }
}
