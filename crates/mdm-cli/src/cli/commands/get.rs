//! `mdm get` – download one URL or repository.

use anyhow::Result;
use mdm_core::config::MdmConfig;
use mdm_core::job::{GitOptions, Job, JobId, JobKind};
use std::path::PathBuf;

use super::run::run_jobs;

pub async fn run_get(
    cfg: &MdmConfig,
    url: String,
    kind: Option<JobKind>,
    output: Option<PathBuf>,
    depth: Option<u32>,
    branch: Option<String>,
) -> Result<bool> {
    let kind = kind.unwrap_or_else(|| JobKind::infer(&url));
    let job = match kind {
        JobKind::Http => {
            if depth.is_some() || branch.is_some() {
                tracing::warn!("--depth and --branch only apply to git jobs; ignoring");
            }
            Job::http(JobId(1), url, output, cfg.connections)
        }
        JobKind::Git => Job::git(JobId(1), url, output, GitOptions { depth, branch }),
    };
    tracing::info!(job = %job.id, kind = %job.kind, source = %job.source, "single job");
    run_jobs(cfg, vec![job]).await
}
