//! Console progress: one bar per frame processing stage.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use skyclear::{FrameProcessingState, ProgressReporter, SkyclearError, StageMap};

pub struct StageBars {
    multi: MultiProgress,
    bars: Vec<(FrameProcessingState, ProgressBar)>,
}

/// Stages a frame only passes through while it holds one of the concurrency slots.
fn is_in_flight(stage: FrameProcessingState) -> bool {
    !matches!(stage, FrameProcessingState::OutlierProcessingComplete | FrameProcessingState::Complete)
}

impl StageBars {
    /// In-flight stages are measured against `max_concurrent_frames`, the waiting and
    /// finished stages against `frame_count`.
    pub fn new(frame_count: usize, max_concurrent_frames: usize) -> Self {
        let multi = MultiProgress::new();
        let style = ProgressStyle::default_bar()
            .template("{msg:>28} [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let bars = FrameProcessingState::ALL
            .iter()
            .map(|stage| {
                let length = if is_in_flight(*stage) {
                    max_concurrent_frames.min(frame_count)
                } else {
                    frame_count
                };
                let bar = multi.add(ProgressBar::new(length as u64));
                bar.set_style(style.clone());
                bar.set_message(stage.name());
                (*stage, bar)
            })
            .collect();
        Self { multi, bars }
    }

    pub fn finish(&self) {
        for (_, bar) in &self.bars {
            bar.finish();
        }
    }
}

impl ProgressReporter for StageBars {
    fn on_stage_change(&self, _frame: usize, _stage: FrameProcessingState, stages: &StageMap) {
        for (stage, bar) in &self.bars {
            bar.set_position(stages.count(*stage) as u64);
        }
    }

    fn on_frame_failed(&self, frame: usize, error: &SkyclearError) {
        let _ = self.multi.println(format!("frame {frame} failed: {error}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_stages_are_bounded_by_concurrency() {
        let bars = StageBars::new(40, 4);
        for (stage, bar) in &bars.bars {
            let expected = if is_in_flight(*stage) { 4 } else { 40 };
            assert_eq!(bar.length(), Some(expected), "{stage}");
        }
        assert!(is_in_flight(FrameProcessingState::Painting));
        assert!(!is_in_flight(FrameProcessingState::Complete));

        let short = StageBars::new(2, 8);
        assert!(short.bars.iter().all(|(_, bar)| bar.length() == Some(2)));
    }
}
