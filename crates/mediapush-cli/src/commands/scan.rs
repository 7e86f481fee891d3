//! Scan command - record a library directory's media as `pending`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::context::AppContext;
use crate::output::{OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct ScanCommand {
    /// Library directory to enumerate
    pub dir: PathBuf,
}

impl ScanCommand {
    pub async fn execute(
        &self,
        ctx: &AppContext,
        format: OutputFormat,
        fmt: &dyn OutputFormatter,
    ) -> Result<()> {
        let root = std::fs::canonicalize(&self.dir)
            .with_context(|| format!("Library directory {} not found", self.dir.display()))?;
        let engine = ctx.engine(root.clone(), ctx.offline_credentials());
        let report = engine.scan().await?;

        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({
                "root": root.display().to_string(),
                "inserted": report.inserted,
                "updated": report.updated,
            }));
        } else {
            fmt.success(&format!("Scanned {}", root.display()));
            fmt.field("New items", &report.inserted.to_string());
            fmt.field("Already known", &report.updated.to_string());
        }
        Ok(())
    }
}
