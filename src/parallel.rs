use crate::importer::RawConversation;
use crate::process::{export_conversation, plan_exports};
use crate::utils::{ExportConfig, ExportSummary, ProcessResult, short_id};
use crossbeam_channel::bounded;
use eyre::{Context, Result};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, info};

/// Exports every conversation on a pool of scoped worker threads.
///
/// A failing conversation is logged and counted; the rest of the batch carries on.
pub fn execute(config: &ExportConfig, conversations: Vec<RawConversation>) -> Result<ExportSummary> {
    fs::create_dir_all(&config.target_dir).wrap_err_with(|| {
        format!(
            "Failed to create target directory: {}",
            config.target_dir.display()
        )
    })?;

    let jobs = plan_exports(conversations);
    if !config.quiet {
        info!("Found {} conversations.", jobs.len());
    }

    let (tx, rx) = bounded::<&(RawConversation, String)>(64);
    let count_created = AtomicUsize::new(0);
    let count_updated = AtomicUsize::new(0);
    let count_skipped = AtomicUsize::new(0);
    let count_errors = AtomicUsize::new(0);
    let n_workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
        .min(jobs.len())
        .max(1);

    std::thread::scope(|s| {
        for _ in 0..n_workers {
            let rx = rx.clone();
            let (count_created, count_updated, count_skipped, count_errors) =
                (&count_created, &count_updated, &count_skipped, &count_errors);

            s.spawn(move || {
                while let Ok((conv, stem)) = rx.recv() {
                    match export_conversation(conv, stem, config) {
                        Ok(ProcessResult::Created) => {
                            count_created.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(ProcessResult::Updated) => {
                            count_updated.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(ProcessResult::Skipped) => {
                            count_skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            count_errors.fetch_add(1, Ordering::Relaxed);
                            error!("Error [{}]: {:#}", short_id(conv.id()), e);
                        }
                    }
                }
            });
        }

        drop(rx);

        for job in &jobs {
            if tx.send(job).is_err() {
                break;
            }
        }

        drop(tx);
    });

    let summary = ExportSummary {
        created: count_created.into_inner(),
        updated: count_updated.into_inner(),
        skipped: count_skipped.into_inner(),
        errors: count_errors.into_inner(),
    };
    if !config.quiet {
        info!("{}", summary);
    }

    Ok(summary)
}
