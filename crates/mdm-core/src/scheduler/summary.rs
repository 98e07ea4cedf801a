use crate::job::{Job, JobId, JobKind};
use crate::progress::JobOutcome;

/// Terminal outcome of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub id: JobId,
    pub kind: JobKind,
    pub source: String,
    pub outcome: JobOutcome,
}

impl JobResult {
    pub(crate) fn new(job: &Job, outcome: JobOutcome) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            source: job.source.clone(),
            outcome,
        }
    }
}

/// Results of a scheduler run, ordered by job id.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub results: Vec<JobResult>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_failed()).count()
    }

    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Completed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Skipped))
    }

    /// True when no job failed; decides the process exit code.
    pub fn success(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&JobOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }
}
