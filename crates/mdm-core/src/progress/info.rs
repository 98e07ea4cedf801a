use indicatif::HumanDuration;
use std::time::{Duration, Instant};

use crate::job::{JobState, ProgressMode};

use super::JobOutcome;

/// Aggregate progress of one job. Owned by the progress thread.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub label: String,
    pub mode: ProgressMode,
    /// Expected size; `None` while unknown.
    pub total: Option<u64>,
    /// Cumulative bytes, net of discarded partials.
    pub downloaded: u64,
    /// Bytes/s between the two most recent samples.
    pub speed: f64,
    /// Bytes/s since the job started downloading.
    pub average_speed: f64,
    pub state: JobState,
    pub outcome: Option<JobOutcome>,
    /// Byte count at finish.
    pub final_bytes: u64,
    pub last_line: Option<String>,
    pub registered: Instant,
    pub started: Option<Instant>,
    pub finished: Option<Instant>,
    last_sample: Option<(Instant, u64)>,
}

impl ProgressInfo {
    pub fn new(label: String, mode: ProgressMode, now: Instant) -> Self {
        Self {
            label,
            mode,
            total: None,
            downloaded: 0,
            speed: 0.0,
            average_speed: 0.0,
            state: JobState::Pending,
            outcome: None,
            final_bytes: 0,
            last_line: None,
            registered: now,
            started: None,
            finished: None,
            last_sample: None,
        }
    }

    pub fn add_bytes(&mut self, delta: i64) {
        self.downloaded = if delta >= 0 {
            self.downloaded.saturating_add(delta.unsigned_abs())
        } else {
            self.downloaded.saturating_sub(delta.unsigned_abs())
        };
    }

    pub fn set_state(&mut self, state: JobState, now: Instant) {
        if state == JobState::Downloading && self.started.is_none() {
            self.started = Some(now);
        }
        self.state = state;
    }

    pub fn finish(&mut self, outcome: JobOutcome, now: Instant) {
        self.state = if outcome.is_failed() {
            JobState::Failed
        } else {
            JobState::Completed
        };
        self.final_bytes = self.downloaded;
        self.finished = Some(now);
        self.speed = 0.0;
        self.update_average(now);
        self.outcome = Some(outcome);
    }

    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    /// Takes a speed sample. Called once per refresh, independent of how
    /// often bytes arrive.
    pub fn sample(&mut self, now: Instant) {
        if self.is_done() {
            return;
        }
        if let Some((at, bytes)) = self.last_sample {
            let dt = now.duration_since(at).as_secs_f64();
            if dt > 0.0 {
                self.speed = self.downloaded.saturating_sub(bytes) as f64 / dt;
            }
        }
        self.last_sample = Some((now, self.downloaded));
        self.update_average(now);
    }

    fn update_average(&mut self, now: Instant) {
        if let Some(started) = self.started {
            let elapsed = now.duration_since(started).as_secs_f64();
            if elapsed > 0.0 {
                self.average_speed = self.downloaded as f64 / elapsed;
            }
        }
    }

    /// Time left at the current instantaneous speed.
    pub fn eta(&self) -> Option<Duration> {
        let total = self.total?;
        if self.speed <= 0.0 {
            return None;
        }
        let remaining = total.saturating_sub(self.downloaded);
        Some(Duration::from_secs_f64(remaining as f64 / self.speed))
    }

    /// Wall time from start (or registration) until finish (or `now`).
    pub fn elapsed(&self, now: Instant) -> Duration {
        let from = self.started.unwrap_or(self.registered);
        self.finished.unwrap_or(now).saturating_duration_since(from)
    }
}

pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(d) => HumanDuration(d).to_string(),
        None => "calculating…".to_string(),
    }
}
