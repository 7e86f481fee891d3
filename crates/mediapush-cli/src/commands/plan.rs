//! Plan command - preview the next batch without staging anything

use anyhow::Result;
use clap::Args;

use mediapush_upload::CycleOptions;

use super::ClassArgs;
use crate::context::AppContext;
use crate::output::{format_bytes, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct PlanCommand {
    #[command(flatten)]
    pub class: ClassArgs,
}

impl PlanCommand {
    pub async fn execute(
        &self,
        ctx: &AppContext,
        format: OutputFormat,
        fmt: &dyn OutputFormatter,
    ) -> Result<()> {
        let options = CycleOptions {
            media_class: self.class.media_class(),
            ..CycleOptions::default()
        };
        let batch = ctx.local_engine().plan(&options).await?;

        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::to_value(&batch)?);
            return Ok(());
        }

        fmt.field("Free space", &format_bytes(batch.free_space_bytes));
        fmt.field("Budget", &format_bytes(batch.budget_bytes));
        if batch.is_empty() {
            fmt.warn("Nothing fits in the current budget");
        } else {
            fmt.success(&format!(
                "Next batch: {} item(s), {}",
                batch.item_count(),
                format_bytes(batch.total_bytes)
            ));
            for id in &batch.item_ids {
                fmt.info(&format!("  {id}"));
            }
        }
        for excluded in &batch.excluded {
            fmt.info(&format!(
                "  excluded {} ({}): {}",
                excluded.item_id,
                format_bytes(excluded.size_bytes),
                excluded.reason
            ));
        }
        Ok(())
    }
}
