//! `indicatif` rendering of the progress board.

use indicatif::{HumanBytes, HumanDuration, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::time::Instant;

use crate::job::{JobId, JobState, ProgressMode};

use super::{format_eta, JobOutcome, ProgressBoard, ProgressInfo};

fn style(template: &str, fallback: fn() -> ProgressStyle) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| fallback())
}

fn bar_style() -> ProgressStyle {
    style("{prefix:.bold} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {msg}", ProgressStyle::default_bar)
        .progress_chars("=>-")
}

fn spinner_style() -> ProgressStyle {
    style("{spinner} {prefix:.bold} {msg}", ProgressStyle::default_spinner)
}

fn done_style() -> ProgressStyle {
    style("{prefix:.bold} {msg}", ProgressStyle::default_spinner)
}

/// One bar per `Bar` job, one spinner per `LineStream` job (or while the
/// size is unknown).
pub(super) struct Renderer {
    multi: MultiProgress,
    bars: HashMap<JobId, ProgressBar>,
}

impl Renderer {
    pub(super) fn new(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: HashMap::new(),
        }
    }

    pub(super) fn add(&mut self, job: JobId, info: &ProgressInfo) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style());
        bar.set_prefix(info.label.clone());
        bar.set_message(info.state.to_string());
        self.bars.insert(job, bar);
    }

    pub(super) fn refresh(&mut self, board: &ProgressBoard) {
        for (job, info) in board.iter() {
            if info.is_done() {
                continue;
            }
            if let Some(bar) = self.bars.get(&job) {
                draw(bar, info);
            }
        }
    }

    pub(super) fn finish(&mut self, job: JobId, info: &ProgressInfo) {
        let Some(bar) = self.bars.remove(&job) else {
            return;
        };
        let Some(outcome) = &info.outcome else {
            return;
        };
        let detail = match outcome {
            JobOutcome::Completed => format!(
                "{} in {} ({}/s)",
                HumanBytes(info.final_bytes),
                HumanDuration(info.elapsed(Instant::now())),
                HumanBytes(info.average_speed as u64)
            ),
            JobOutcome::Skipped => "already complete".to_string(),
            JobOutcome::Failed(e) => format!("failed: {}", e),
        };
        bar.set_style(done_style());
        bar.set_prefix(format!("{} {}", outcome.glyph(), info.label));
        if outcome.is_failed() {
            bar.abandon_with_message(detail);
        } else {
            bar.finish_with_message(detail);
        }
    }
}

fn draw(bar: &ProgressBar, info: &ProgressInfo) {
    if info.state != JobState::Downloading {
        bar.set_message(info.state.to_string());
        bar.tick();
        return;
    }
    match (info.mode, info.total) {
        (ProgressMode::Bar, Some(total)) if total > 0 => {
            if bar.length() != Some(total) {
                bar.set_style(bar_style());
                bar.set_length(total);
            }
            bar.set_position(info.downloaded.min(total));
            bar.set_message(format!(
                "{}/s ETA {}",
                HumanBytes(info.speed as u64),
                format_eta(info.eta())
            ));
        }
        (ProgressMode::Bar, _) => {
            bar.set_message(format!("{} {}/s", HumanBytes(info.downloaded), HumanBytes(info.speed as u64)));
            bar.tick();
        }
        (ProgressMode::LineStream, _) => {
            bar.set_message(info.last_line.clone().unwrap_or_else(|| info.state.to_string()));
            bar.tick();
        }
    }
}
