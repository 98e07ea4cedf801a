//! Run queued jobs on a fixed pool of worker threads.
//!
//! The queue is filled before any worker starts; each worker takes the next
//! job, drives it through validate, build and execute, reports every
//! transition, and moves on. A failing or panicking job never stops its
//! siblings, and there is no retry at this level. Two jobs may not resolve
//! to the same destination in one run; the later one fails.

mod summary;

pub use summary::{JobResult, RunSummary};

use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::thread;

use crate::control::CancelToken;
use crate::job::{BuildOutcome, ExecContext, Job, JobError, JobId, JobState, Registry};
use crate::progress::{JobOutcome, Reporter};

pub struct Scheduler<'a> {
    registry: &'a Registry,
    workers: usize,
    cancel: CancelToken,
}

impl<'a> Scheduler<'a> {
    pub fn new(registry: &'a Registry, workers: usize, cancel: CancelToken) -> Self {
        Self {
            registry,
            workers: workers.max(1),
            cancel,
        }
    }

    /// Runs every job to a terminal state. `reporter_for` hands out the
    /// progress handle for a job.
    pub fn run<F>(&self, jobs: Vec<Job>, reporter_for: F) -> RunSummary
    where
        F: Fn(JobId) -> Reporter,
    {
        let queue: VecDeque<(Job, Reporter)> = jobs
            .into_iter()
            .map(|job| {
                let reporter = reporter_for(job.id);
                reporter.register(job.label(), job.progress_mode);
                (job, reporter)
            })
            .collect();
        let workers = self.workers.min(queue.len()).max(1);
        tracing::info!(jobs = queue.len(), workers, "scheduler starting");

        let queue = Mutex::new(queue);
        let results = Mutex::new(Vec::new());
        let reserved = Mutex::new(HashSet::new());

        thread::scope(|s| {
            for n in 0..workers {
                let queue = &queue;
                let results = &results;
                let reserved = &reserved;
                s.spawn(move || {
                    tracing::debug!(worker = n, "worker started");
                    while !self.cancel.is_cancelled() {
                        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                        let Some((mut job, reporter)) = next else { break };
                        let result = self.run_job(&mut job, reporter, reserved);
                        results.lock().unwrap_or_else(PoisonError::into_inner).push(result);
                    }
                    tracing::debug!(worker = n, "worker exiting");
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_else(PoisonError::into_inner);
        for (job, reporter) in queue.into_inner().unwrap_or_else(PoisonError::into_inner) {
            tracing::info!(job = %job.id, "not started, cancelled");
            let outcome = JobOutcome::Failed(JobError::Cancelled.to_string());
            reporter.state(JobState::Failed);
            reporter.finish(outcome.clone());
            results.push(JobResult::new(&job, outcome));
        }
        results.sort_by_key(|r| r.id);
        RunSummary { results }
    }

    fn run_job(&self, job: &mut Job, reporter: Reporter, reserved: &Mutex<HashSet<PathBuf>>) -> JobResult {
        let driven = panic::catch_unwind(AssertUnwindSafe(|| self.drive(job, &reporter, reserved)))
            .unwrap_or_else(|payload| Err(JobError::Panicked(panic_message(payload.as_ref()))));
        let outcome = match driven {
            Ok(BuildOutcome::Ready) => {
                tracing::info!(job = %job.id, "job completed");
                reporter.state(JobState::Completed);
                JobOutcome::Completed
            }
            Ok(BuildOutcome::AlreadySatisfied) => {
                tracing::info!(job = %job.id, "job already satisfied");
                reporter.state(JobState::Completed);
                JobOutcome::Skipped
            }
            Err(e) => {
                tracing::warn!(job = %job.id, source = %job.source, error = %e, "job failed");
                reporter.state(JobState::Failed);
                JobOutcome::Failed(e.to_string())
            }
        };
        reporter.finish(outcome.clone());
        JobResult::new(job, outcome)
    }

    fn drive(
        &self,
        job: &mut Job,
        reporter: &Reporter,
        reserved: &Mutex<HashSet<PathBuf>>,
    ) -> Result<BuildOutcome, JobError> {
        let downloader = self
            .registry
            .get(job.kind)
            .ok_or(JobError::Unsupported(job.kind))?;

        reporter.state(JobState::Validating);
        downloader.validate(job)?;

        reporter.state(JobState::Building);
        if downloader.build(job)? == BuildOutcome::AlreadySatisfied {
            return Ok(BuildOutcome::AlreadySatisfied);
        }
        if let Some(destination) = &job.destination {
            let mut reserved = reserved.lock().unwrap_or_else(PoisonError::into_inner);
            if !reserved.insert(destination.clone()) {
                return Err(JobError::DuplicateDestination(destination.display().to_string()));
            }
        }
        if self.cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        reporter.state(JobState::Downloading);
        let ctx = ExecContext {
            reporter: reporter.clone(),
            cancel: self.cancel.clone(),
        };
        downloader.execute(job, &ctx)?;
        Ok(BuildOutcome::Ready)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
