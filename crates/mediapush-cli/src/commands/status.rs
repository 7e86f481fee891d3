//! Status command - counts per status, pending bytes and recent failures

use std::collections::HashMap;

use anyhow::Result;
use clap::Args;
use serde_json::{json, Map, Value};

use mediapush_core::domain::{ItemStatus, MediaClass};
use mediapush_core::ports::ClassTotal;
use mediapush_upload::StatusReport;

use crate::context::AppContext;
use crate::output::{format_bytes, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// List every failed item instead of a count
    #[arg(long)]
    pub failed: bool,
}

impl StatusCommand {
    pub async fn execute(
        &self,
        ctx: &AppContext,
        format: OutputFormat,
        fmt: &dyn OutputFormatter,
    ) -> Result<()> {
        let engine = ctx.local_engine();
        let report = engine.status().await?;
        let credential = ctx.offline_credentials().state().await;

        if format == OutputFormat::Json {
            let mut value = status_json(&report);
            value["credential"] = json!(credential.as_str());
            fmt.print_json(&value);
            return Ok(());
        }

        fmt.field("Credential", credential.as_str());
        for status in ItemStatus::ALL {
            fmt.field(status.as_str(), &report.count(status).to_string());
        }

        for class in [MediaClass::Photo, MediaClass::Video] {
            let pending = report.pending_by_class.get(&class).copied().unwrap_or_default();
            let committed = report
                .committed_by_class
                .get(&class)
                .copied()
                .unwrap_or_default();
            fmt.field(
                class.as_str(),
                &format!(
                    "{} pending ({}), {} committed ({})",
                    pending.count,
                    format_bytes(pending.bytes),
                    committed.count,
                    format_bytes(committed.bytes)
                ),
            );
        }

        if report.needs_review > 0 {
            fmt.warn(&format!(
                "{} item(s) look visually similar to committed media and need review",
                report.needs_review
            ));
        }

        if let Some(ref batch) = report.last_batch {
            let state = match batch.summary {
                Some(ref s) => format!(
                    "{} committed, {} failed, {} skipped, {} requeued{}",
                    s.committed,
                    s.failed,
                    s.skipped,
                    s.requeued,
                    if s.halted { " (halted)" } else { "" }
                ),
                None => "in progress".to_string(),
            };
            fmt.field(
                "Last batch",
                &format!(
                    "{} item(s) at {}: {state}",
                    batch.item_count(),
                    batch.created_at.format("%Y-%m-%d %H:%M:%S")
                ),
            );
        }

        if self.failed {
            for item in &report.failed {
                let reason = item
                    .status_reason()
                    .map_or_else(|| "unknown".to_string(), |r| r.to_string());
                fmt.info(&format!(
                    "  {} [{reason}] {}",
                    item.id(),
                    item.last_error().unwrap_or("")
                ));
            }
        } else if !report.failed.is_empty() {
            fmt.info("Run 'mediapush status --failed' for failure details");
        }
        Ok(())
    }
}

fn status_json(report: &StatusReport) -> Value {
    let mut by_status = Map::new();
    for status in ItemStatus::ALL {
        by_status.insert(status.as_str().to_string(), json!(report.count(status)));
    }

    json!({
        "by_status": by_status,
        "pending": class_totals(&report.pending_by_class),
        "committed": class_totals(&report.committed_by_class),
        "needs_review": report.needs_review,
        "failed": report.failed,
        "last_batch": report.last_batch,
    })
}

fn class_totals(totals: &HashMap<MediaClass, ClassTotal>) -> Value {
    let mut map = Map::new();
    for class in [MediaClass::Photo, MediaClass::Video] {
        let total = totals.get(&class).copied().unwrap_or_default();
        map.insert(
            class.as_str().to_string(),
            json!({ "count": total.count, "bytes": total.bytes }),
        );
    }
    Value::Object(map)
}
