//! Shared runner: schedule jobs under the live progress display.

use anyhow::{Context, Result};
use indicatif::ProgressDrawTarget;
use mdm_core::config::MdmConfig;
use mdm_core::control::CancelToken;
use mdm_core::downloaders::standard_registry;
use mdm_core::job::Job;
use mdm_core::progress::ProgressManager;
use mdm_core::scheduler::Scheduler;

/// Runs `jobs` to completion, prints the summary, and returns true when none failed.
/// Ctrl-C cancels: running transfers stop and queued jobs are reported as failed.
pub async fn run_jobs(cfg: &MdmConfig, jobs: Vec<Job>) -> Result<bool> {
    let cancel = CancelToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling jobs");
                eprintln!("\ninterrupted, stopping...");
                cancel.cancel();
            }
        }
    });

    let registry = standard_registry(cfg);
    let workers = cfg.workers;
    let refresh = cfg.progress_refresh();
    let (summary, report) = tokio::task::spawn_blocking(move || -> Result<_> {
        let progress = ProgressManager::start(refresh, ProgressDrawTarget::stderr())?;
        let summary = Scheduler::new(&registry, workers, cancel).run(jobs, |id| progress.reporter(id));
        let report = progress.finish()?;
        Ok((summary, report))
    })
    .await
    .context("scheduler task")??;
    interrupt.abort();

    println!("{}", report);
    tracing::info!(
        completed = summary.completed(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "run finished"
    );
    Ok(summary.success())
}
