//! `mdm batch` – run every job in a batch file.

use anyhow::{Context, Result};
use mdm_core::batch::load_batch;
use mdm_core::config::MdmConfig;
use std::path::Path;

use super::run::run_jobs;

pub async fn run_batch(cfg: &MdmConfig, file: &Path) -> Result<bool> {
    let batch = load_batch(file, cfg.connections).with_context(|| format!("load batch {}", file.display()))?;
    for warning in &batch.warnings {
        eprintln!("warning: {}", warning);
    }
    if batch.jobs.is_empty() {
        println!("No jobs in {}.", file.display());
        return Ok(true);
    }
    run_jobs(cfg, batch.jobs).await
}
