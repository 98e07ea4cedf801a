//! Live progress: one display thread owns all progress state.
//!
//! Jobs and chunk workers never touch display state directly. They send
//! [`ProgressEvent`]s through a [`Reporter`]; the [`ProgressManager`] thread
//! applies them to its [`ProgressBoard`], samples speeds on a fixed refresh
//! interval and renders with `indicatif`. On shutdown it returns a
//! [`ProgressReport`] summarising every job.

mod board;
mod info;
mod render;
mod report;

pub use board::ProgressBoard;
pub use info::{format_eta, ProgressInfo};
pub use report::{JobSummary, ProgressReport};

use anyhow::{Context, Result};
use indicatif::ProgressDrawTarget;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::job::{JobId, JobState, ProgressMode};

use render::Renderer;

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// The destination already held the complete resource.
    Skipped,
    Failed(String),
}

impl JobOutcome {
    pub fn glyph(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "✓",
            JobOutcome::Skipped => "=",
            JobOutcome::Failed(_) => "✗",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobOutcome::Failed(_))
    }
}

/// Message to the progress thread. Every variant is tagged with its job.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Register { job: JobId, label: String, mode: ProgressMode },
    State { job: JobId, state: JobState },
    /// Expected size became known (or is known to be unknown).
    Total { job: JobId, total: Option<u64> },
    /// Signed byte delta; negative when a corrupt partial is discarded.
    Bytes { job: JobId, delta: i64 },
    Line { job: JobId, text: String },
    Finish { job: JobId, outcome: JobOutcome },
}

impl ProgressEvent {
    pub fn job(&self) -> JobId {
        match self {
            ProgressEvent::Register { job, .. }
            | ProgressEvent::State { job, .. }
            | ProgressEvent::Total { job, .. }
            | ProgressEvent::Bytes { job, .. }
            | ProgressEvent::Line { job, .. }
            | ProgressEvent::Finish { job, .. } => *job,
        }
    }
}

/// Job-tagged sender on the progress channel. Cheap to clone; one clone per
/// chunk thread.
///
/// Sends never fail from the caller's point of view: once the display is
/// gone, events are dropped.
#[derive(Debug, Clone)]
pub struct Reporter {
    job: JobId,
    tx: Sender<ProgressEvent>,
}

impl Reporter {
    pub fn new(job: JobId, tx: Sender<ProgressEvent>) -> Self {
        Self { job, tx }
    }

    /// A reporter whose events are collected on the returned receiver.
    pub fn channel(job: JobId) -> (Self, Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(job, tx), rx)
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn bytes(&self, delta: i64) {
        if delta != 0 {
            self.send(ProgressEvent::Bytes { job: self.job, delta });
        }
    }

    pub fn total(&self, total: Option<u64>) {
        self.send(ProgressEvent::Total { job: self.job, total });
    }

    pub fn line(&self, text: impl Into<String>) {
        self.send(ProgressEvent::Line {
            job: self.job,
            text: text.into(),
        });
    }

    pub fn register(&self, label: impl Into<String>, mode: ProgressMode) {
        self.send(ProgressEvent::Register {
            job: self.job,
            label: label.into(),
            mode,
        });
    }

    pub fn state(&self, state: JobState) {
        self.send(ProgressEvent::State { job: self.job, state });
    }

    pub fn finish(&self, outcome: JobOutcome) {
        self.send(ProgressEvent::Finish {
            job: self.job,
            outcome,
        });
    }

    fn send(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

/// Handle to the running progress thread.
pub struct ProgressManager {
    tx: Sender<ProgressEvent>,
    handle: JoinHandle<ProgressReport>,
}

impl ProgressManager {
    /// Spawns the display thread, redrawing every `refresh` onto `target`.
    pub fn start(refresh: Duration, target: ProgressDrawTarget) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("mdm-progress".to_string())
            .spawn(move || run(rx, refresh, target))
            .context("spawn progress thread")?;
        Ok(Self { tx, handle })
    }

    pub fn reporter(&self, job: JobId) -> Reporter {
        Reporter::new(job, self.tx.clone())
    }

    /// Waits for every outstanding [`Reporter`] to be dropped, then returns
    /// the final report.
    pub fn finish(self) -> Result<ProgressReport> {
        drop(self.tx);
        self.handle
            .join()
            .map_err(|_| anyhow::anyhow!("progress thread panicked"))
    }
}

fn run(rx: Receiver<ProgressEvent>, refresh: Duration, target: ProgressDrawTarget) -> ProgressReport {
    let started = Instant::now();
    let mut board = ProgressBoard::default();
    let mut renderer = Renderer::new(target);
    let mut next_tick = started + refresh;

    loop {
        let now = Instant::now();
        if now >= next_tick {
            board.sample(now);
            renderer.refresh(&board);
            next_tick = now + refresh;
            continue;
        }
        match rx.recv_timeout(next_tick - now) {
            Ok(event) => {
                let job = event.job();
                let registered = matches!(event, ProgressEvent::Register { .. });
                let finished = matches!(event, ProgressEvent::Finish { .. });
                if !board.apply(event, Instant::now()) {
                    tracing::debug!(%job, "progress event for unregistered job dropped");
                    continue;
                }
                if let Some(info) = board.get(job) {
                    if registered {
                        renderer.add(job, info);
                    } else if finished {
                        renderer.finish(job, info);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let now = Instant::now();
    board.sample(now);
    renderer.refresh(&board);
    board.report(now.duration_since(started))
}
