//! End-of-run summary.

use indicatif::{HumanBytes, HumanDuration};
use std::fmt;
use std::time::Duration;

use crate::job::JobId;

use super::JobOutcome;

#[derive(Debug, Clone)]
pub struct JobSummary {
    pub id: JobId,
    pub label: String,
    pub status: JobOutcome,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Per-job outcomes plus aggregate throughput for the whole run.
#[derive(Debug, Clone, Default)]
pub struct ProgressReport {
    pub jobs: Vec<JobSummary>,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl ProgressReport {
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, JobOutcome::Failed(_)))
    }

    pub fn completed(&self) -> usize {
        self.count(|s| *s == JobOutcome::Completed)
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| *s == JobOutcome::Skipped)
    }

    fn count(&self, pred: impl Fn(&JobOutcome) -> bool) -> usize {
        self.jobs.iter().filter(|j| pred(&j.status)).count()
    }

    pub fn total_bytes(&self) -> u64 {
        self.jobs.iter().map(|j| j.bytes).sum()
    }

    /// Aggregate bytes/s over the run's wall time.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.total_bytes() as f64 / secs
    }
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for job in &self.jobs {
            write!(
                f,
                "{} {} {} in {}",
                job.status.glyph(),
                job.label,
                HumanBytes(job.bytes),
                HumanDuration(job.elapsed)
            )?;
            match &job.status {
                JobOutcome::Skipped => writeln!(f, " (already complete)")?,
                JobOutcome::Failed(e) => writeln!(f, ": {}", e)?,
                JobOutcome::Completed => writeln!(f)?,
            }
        }
        write!(
            f,
            "{} completed, {} skipped, {} failed; {} in {} ({}/s)",
            self.completed(),
            self.skipped(),
            self.failed(),
            HumanBytes(self.total_bytes()),
            HumanDuration(self.elapsed),
            HumanBytes(self.throughput() as u64)
        )
    }
}
