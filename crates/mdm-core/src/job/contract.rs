use crate::control::CancelToken;
use crate::progress::Reporter;

use super::{Job, JobError};

/// Result of [`Downloader::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Destination resolved; `execute` should run.
    Ready,
    /// The destination already holds the complete resource; skip `execute`.
    AlreadySatisfied,
}

/// Handed to [`Downloader::execute`] by the scheduler.
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub reporter: Reporter,
    pub cancel: CancelToken,
}

/// Uniform lifecycle every protocol implements.
///
/// The scheduler calls `validate`, then `build`, then (unless `build`
/// returned [`BuildOutcome::AlreadySatisfied`]) `execute`, on the worker
/// thread that owns the job.
pub trait Downloader: Send + Sync {
    /// Cheap, side-effect free check of the job's inputs.
    fn validate(&self, job: &Job) -> Result<(), JobError>;

    /// Metadata lookup, destination inference and collision handling.
    fn build(&self, job: &mut Job) -> Result<BuildOutcome, JobError>;

    /// Performs the transfer. Must resume, not restart, after a partial run.
    fn execute(&self, job: &mut Job, ctx: &ExecContext) -> Result<(), JobError>;
}
