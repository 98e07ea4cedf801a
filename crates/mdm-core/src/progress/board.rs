use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::job::JobId;

use super::report::{JobSummary, ProgressReport};
use super::{JobOutcome, ProgressEvent, ProgressInfo};

/// Progress state of every job in a run, keyed (and rendered) by job id.
#[derive(Debug, Default)]
pub struct ProgressBoard {
    jobs: BTreeMap<JobId, ProgressInfo>,
}

impl ProgressBoard {
    /// Applies one event. Returns false for events about a job that was
    /// never registered.
    pub fn apply(&mut self, event: ProgressEvent, now: Instant) -> bool {
        if let ProgressEvent::Register { job, label, mode } = event {
            self.jobs.insert(job, ProgressInfo::new(label, mode, now));
            return true;
        }
        let Some(info) = self.jobs.get_mut(&event.job()) else {
            return false;
        };
        match event {
            ProgressEvent::Register { .. } => {}
            ProgressEvent::State { state, .. } => info.set_state(state, now),
            ProgressEvent::Total { total, .. } => info.total = total,
            ProgressEvent::Bytes { delta, .. } => {
                if !info.is_done() {
                    info.add_bytes(delta);
                }
            }
            ProgressEvent::Line { text, .. } => info.last_line = Some(text),
            ProgressEvent::Finish { outcome, .. } => info.finish(outcome, now),
        }
        true
    }

    pub fn sample(&mut self, now: Instant) {
        for info in self.jobs.values_mut() {
            info.sample(now);
        }
    }

    pub fn get(&self, job: JobId) -> Option<&ProgressInfo> {
        self.jobs.get(&job)
    }

    pub fn iter(&self) -> impl Iterator<Item = (JobId, &ProgressInfo)> {
        self.jobs.iter().map(|(id, info)| (*id, info))
    }

    pub fn report(&self, elapsed: Duration) -> ProgressReport {
        let now = Instant::now();
        let jobs = self
            .jobs
            .iter()
            .map(|(id, info)| JobSummary {
                id: *id,
                label: info.label.clone(),
                status: info
                    .outcome
                    .clone()
                    .unwrap_or_else(|| JobOutcome::Failed("did not finish".to_string())),
                bytes: if info.is_done() { info.final_bytes } else { info.downloaded },
                elapsed: info.elapsed(now),
            })
            .collect();
        ProgressReport { jobs, elapsed }
    }
}
