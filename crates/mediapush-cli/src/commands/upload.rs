//! Upload command - run upload cycles until nothing is left to do
//!
//! The first Ctrl-C pauses: no new items are admitted and in-flight items
//! finish their current phase. A second Ctrl-C aborts in-flight phases;
//! the interrupted items stay `staged` for the next run.

use anyhow::{bail, Result};
use clap::Args;
use tracing::{info, warn};

use mediapush_core::domain::{BatchSummary, CredentialState};
use mediapush_upload::{CredentialError, CycleOptions, CycleReport, PauseHandle};

use super::ClassArgs;
use crate::context::AppContext;
use crate::output::{OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct UploadCommand {
    /// Parallel transfers (overrides upload.concurrency)
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    #[command(flatten)]
    pub class: ClassArgs,

    /// Return failed items to pending before the first cycle
    #[arg(long)]
    pub retry_failed: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}

/// Totals over every cycle of one invocation
#[derive(Debug, Default)]
struct RunTotals {
    cycles: usize,
    summary: BatchSummary,
    requeued_failed: u64,
}

impl RunTotals {
    fn add(&mut self, report: &CycleReport) {
        self.cycles += 1;
        self.requeued_failed += report.requeued_failed;
        self.summary.committed += report.summary.committed;
        self.summary.failed += report.summary.failed;
        self.summary.skipped += report.summary.skipped;
        self.summary.requeued = report.summary.requeued;
        self.summary.halted |= report.summary.halted;
    }
}

/// Whether another cycle could make progress
fn should_continue(report: &CycleReport, handle: &PauseHandle) -> bool {
    let planned = report.batch.as_ref().is_some_and(|b| !b.is_empty());
    let settled = report.summary.committed + report.summary.failed + report.summary.skipped;
    planned && settled > 0 && !report.summary.halted && !handle.is_paused()
}

impl UploadCommand {
    pub async fn execute(
        &self,
        ctx: &AppContext,
        format: OutputFormat,
        fmt: &dyn OutputFormatter,
    ) -> Result<()> {
        let credentials = ctx.credentials()?;
        let state = credentials.state().await;
        match state {
            CredentialState::ReauthenticationRequired => bail!(
                CredentialError::ReauthenticationRequired("refresh grant revoked".to_string())
            ),
            s if !s.can_upload() => bail!(CredentialError::NotAuthenticated),
            _ => {}
        }

        let engine = ctx.engine(".".into(), credentials);
        // Held for the whole run; recovery is only sound with no other uploader
        let lock = engine.lock()?;
        engine.recover(&lock).await?;

        let handle = PauseHandle::new();
        let watcher = tokio::spawn(watch_interrupts(handle.clone()));

        let mut options = CycleOptions {
            media_class: self.class.media_class(),
            retry_failed: self.retry_failed,
            concurrency: self.concurrency,
        };
        let mut totals = RunTotals::default();

        let outcome = loop {
            let report = match engine.run_cycle(&options, &handle).await {
                Ok(report) => report,
                Err(e) => break Err(e),
            };
            totals.add(&report);
            options.retry_failed = false;

            if let Some(ref batch) = report.batch {
                info!(
                    batch_id = %batch.id,
                    items = batch.item_count(),
                    committed = report.summary.committed,
                    failed = report.summary.failed,
                    "Cycle finished"
                );
            }
            if self.once || !should_continue(&report, &handle) {
                break Ok(());
            }
        };
        watcher.abort();
        drop(lock);
        outcome?;

        let summary = &totals.summary;
        if format == OutputFormat::Json {
            fmt.print_json(&serde_json::json!({
                "cycles": totals.cycles,
                "committed": summary.committed,
                "failed": summary.failed,
                "skipped": summary.skipped,
                "requeued": summary.requeued,
                "requeued_failed": totals.requeued_failed,
                "halted": summary.halted,
                "paused": handle.is_paused(),
            }));
        } else {
            if totals.requeued_failed > 0 {
                fmt.info(&format!(
                    "{} failed item(s) returned to pending",
                    totals.requeued_failed
                ));
            }
            fmt.success(&format!(
                "{} committed, {} failed, {} skipped, {} left for the next run",
                summary.committed, summary.failed, summary.skipped, summary.requeued
            ));
            if handle.is_paused() {
                fmt.warn("Upload paused; run 'mediapush upload' again to continue");
            }
        }

        if summary.halted {
            bail!("Uploads halted: the credential was revoked. Run 'mediapush auth login' and retry.");
        }
        Ok(())
    }
}

async fn watch_interrupts(handle: PauseHandle) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    warn!("Interrupted: finishing in-flight phases, press Ctrl-C again to abort");
    handle.pause();

    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Aborting in-flight transfers");
        handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use mediapush_core::domain::{BatchDescriptor, ItemId};

    use super::*;

    fn report(items: usize, committed: usize) -> CycleReport {
        let mut batch = BatchDescriptor::new(100, 100);
        for i in 0..items {
            batch.push(ItemId::new(format!("item-{i}")).unwrap(), 1);
        }
        CycleReport {
            batch: Some(batch),
            summary: BatchSummary {
                committed,
                ..BatchSummary::default()
            },
            ..CycleReport::default()
        }
    }

    #[test]
    fn test_should_continue_after_progress() {
        assert!(should_continue(&report(2, 2), &PauseHandle::new()));
    }

    #[test]
    fn test_stops_on_empty_batch_or_no_progress() {
        let handle = PauseHandle::new();
        assert!(!should_continue(&CycleReport::default(), &handle));
        assert!(!should_continue(&report(0, 0), &handle));
        assert!(!should_continue(&report(2, 0), &handle));
    }

    #[test]
    fn test_stops_when_paused_or_halted() {
        let handle = PauseHandle::new();
        handle.pause();
        assert!(!should_continue(&report(2, 2), &handle));

        let mut halted = report(2, 1);
        halted.summary.halted = true;
        assert!(!should_continue(&halted, &PauseHandle::new()));
    }

    #[test]
    fn test_totals_accumulate() {
        let mut totals = RunTotals::default();
        totals.add(&report(2, 2));
        totals.add(&report(3, 1));
        assert_eq!(totals.cycles, 2);
        assert_eq!(totals.summary.committed, 3);
    }
}
