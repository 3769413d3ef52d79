use crate::importer::RawConversation;
use crate::process::{export_conversation, plan_exports};
use crate::utils::{ExportConfig, ExportSummary, short_id};
use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use tracing::{error, info};

/// The sequential export loop, with a progress bar on stderr.
pub fn execute(config: &ExportConfig, conversations: Vec<RawConversation>) -> Result<ExportSummary> {
    fs::create_dir_all(&config.target_dir).wrap_err_with(|| {
        format!(
            "Failed to create target directory: {}",
            config.target_dir.display()
        )
    })?;

    let jobs = plan_exports(conversations);
    let total = jobs.len() as u64;

    let pb = if config.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)",
            )
            .wrap_err("Invalid progress bar template")?
            .progress_chars("=>-"),
        );
        bar.println(format!("Found {} conversations.", total));
        bar
    };

    let mut summary = ExportSummary::default();
    for (conv, stem) in &jobs {
        match export_conversation(conv, stem, config) {
            Ok(result) => summary.record(result),
            Err(e) => {
                summary.errors += 1;
                pb.suspend(|| error!("Error [{}]: {:#}", short_id(conv.id()), e));
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();

    if !config.quiet {
        info!("{}", summary);
    }

    Ok(summary)
}
