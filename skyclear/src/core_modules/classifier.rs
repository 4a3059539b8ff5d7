// THEORY:
// The classifier is the single-frame judgement layer. It looks at one group in
// isolation and decides whether it is an airplane streak, using nothing but the
// group's own shape, brightness, and Hough lines scored against reference histograms.
//
// Key architectural principles & decision order:
// 1.  **Cheap exits first**: a group past the assume-airplane size is painted without
//     scoring. A group with no Hough lines is left unset; it is not an error, the
//     reconciler gets a chance at it and the painter leaves it alone.
// 2.  **Line shape**: a real streak's Hough result has one sharp peak and a long tail
//     of weak lines. `paint_score_from_lines` measures how early the vote counts fall
//     to half their range and how few distinct counts there are. A large group that
//     scores well here is painted as a line.
// 3.  **Overall score**: otherwise size, aspect ratio, brightness, and line shape are
//     averaged. Fill amount is scored for the logs only.
// 4.  **Shared, read-only calibration**: every frame task holds the same
//     `Arc<ReferenceHistograms>`; classifying never mutates shared state.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::core_modules::histogram::ReferenceHistograms;
use crate::core_modules::hough::Line;
use crate::core_modules::outlier_group::OutlierGroup;
use crate::core_modules::paint_reason::PaintReason;

const BRIGHTNESS_SCORE_CAP: f64 = 100.0;
const BRIGHTNESS_SCORE_SCALE: f64 = 20.0;

/// Every sub-score the classifier computed for one group, for logging and auditing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GroupScores {
    pub size: f64,
    pub aspect_ratio: f64,
    pub fill_amount: f64,
    /// Brightness sub-score already divided down into 0..=1.
    pub brightness: f64,
    pub lines: f64,
    pub overall: f64,
}

#[derive(Debug, Clone)]
pub struct GroupClassifier {
    histograms: Arc<ReferenceHistograms>,
    max_pixel_distance: u16,
    assume_airplane_size: usize,
    looks_like_a_line_min_size: usize,
    min_lines_for_line_score: usize,
}

impl GroupClassifier {
    pub fn new(config: &Config, histograms: Arc<ReferenceHistograms>) -> Self {
        Self {
            histograms,
            max_pixel_distance: config.max_pixel_distance,
            assume_airplane_size: config.assume_airplane_size,
            looks_like_a_line_min_size: config.looks_like_a_line_min_size,
            min_lines_for_line_score: config.min_lines_for_line_score,
        }
    }

    /// How much a ranked list of Hough lines looks like a single dominant line, 0..=1.
    pub fn paint_score_from_lines(&self, lines: &[Line]) -> f64 {
        if lines.len() < self.min_lines_for_line_score || lines.is_empty() {
            return 0.0;
        }
        let first_count = lines[0].count;
        let last_count = lines[lines.len() - 1].count;
        let mid_count = first_count.saturating_sub(last_count) / 2;

        let Some(center_index) = lines.iter().position(|line| line.count <= mid_count) else {
            return 0.0;
        };
        let total = lines.len() as f64;
        let center_position = center_index as f64 / total;
        let distinct_counts = lines.iter().map(|line| line.count).collect::<HashSet<_>>().len();
        let distinct_ratio = distinct_counts as f64 / total;

        let position_score = self.histograms.center_line_position.score(center_position);
        let distinct_score = self.histograms.distinct_counts_ratio.score(distinct_ratio);
        (position_score + distinct_score) / 2.0
    }

    /// Brightness past the threshold, scaled and capped at 100.
    pub fn brightness_score(&self, brightness: u32) -> f64 {
        let threshold = f64::from(self.max_pixel_distance);
        (f64::from(brightness) / threshold * BRIGHTNESS_SCORE_SCALE).min(BRIGHTNESS_SCORE_CAP)
    }

    pub fn scores(&self, group: &OutlierGroup) -> GroupScores {
        let lines = group
            .line_score()
            .unwrap_or_else(|| self.paint_score_from_lines(&group.lines));
        let size = self.histograms.group_size.score(group.size as f64);
        let aspect_ratio = self.histograms.aspect_ratio.score(group.aspect_ratio());
        let fill_amount = self.histograms.fill_amount.score(group.fill_amount());
        let brightness = self.brightness_score(group.brightness) / BRIGHTNESS_SCORE_CAP;
        GroupScores {
            size,
            aspect_ratio,
            fill_amount,
            brightness,
            lines,
            overall: (size + aspect_ratio + brightness + lines) / 4.0,
        }
    }

    /// The verdict for `group`, or `None` when it has no lines to judge by.
    pub fn decide(&self, group: &OutlierGroup) -> Option<PaintReason> {
        if group.size > self.assume_airplane_size {
            return Some(PaintReason::Assumed);
        }
        if group.lines.is_empty() {
            return None;
        }
        let scores = self.scores(group);
        if scores.lines > 0.5 && group.size >= self.looks_like_a_line_min_size {
            return Some(PaintReason::LooksLikeALine(scores.lines));
        }
        if scores.overall > 0.5 {
            Some(PaintReason::GoodScore(scores.overall))
        } else {
            Some(PaintReason::BadScore(scores.overall))
        }
    }

    /// Records the line score on `group` and assigns its verdict.
    pub fn classify(&self, frame: usize, group: &mut OutlierGroup) -> Option<PaintReason> {
        if group.size <= self.assume_airplane_size && !group.lines.is_empty() {
            group.set_line_score(self.paint_score_from_lines(&group.lines));
        }
        let decision = self.decide(group);
        match decision {
            Some(reason) => {
                group.classify(reason);
                if matches!(reason, PaintReason::GoodScore(_) | PaintReason::BadScore(_)) {
                    let scores = self.scores(group);
                    debug!(
                        frame,
                        group = %group.name,
                        size = scores.size,
                        aspect_ratio = scores.aspect_ratio,
                        fill_amount = scores.fill_amount,
                        brightness = scores.brightness,
                        lines = scores.lines,
                        "group scores"
                    );
                }
                debug!(
                    frame,
                    group = %group.name,
                    size = group.size,
                    reason = %reason,
                    will_paint = reason.will_paint()
                );
            }
            None => warn!(frame, group = %group.name, size = group.size, "got no group lines"),
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::bounding_box::Point;

    fn classifier() -> GroupClassifier {
        GroupClassifier::new(&Config::default(), Arc::new(ReferenceHistograms::default()))
    }

    fn diagonal(len: u32, excess: u64) -> OutlierGroup {
        let members = (0..len).map(|i| Point::new(i, i)).collect();
        OutlierGroup::new("group_0".into(), members, excess * u64::from(len))
    }

    fn line(count: u32) -> Line {
        Line { theta: 45.0, rho: 0.0, count }
    }

    #[test]
    fn big_groups_are_assumed_without_lines() {
        let group = diagonal(1001, 100);
        assert!(group.lines.is_empty());
        assert_eq!(classifier().decide(&group), Some(PaintReason::Assumed));
    }

    #[test]
    fn no_lines_stays_unset() {
        let mut group = diagonal(200, 100);
        assert_eq!(classifier().classify(3, &mut group), None);
        assert_eq!(group.paint_reason(), None);
        assert!(!group.will_paint());
    }

    #[test]
    fn few_lines_score_zero() {
        let lines: Vec<_> = (0..9).map(|i| line(100 - i)).collect();
        assert_eq!(classifier().paint_score_from_lines(&lines), 0.0);
    }

    #[test]
    fn flat_line_counts_score_zero() {
        let lines: Vec<_> = (0..20).map(|_| line(5)).collect();
        assert_eq!(classifier().paint_score_from_lines(&lines), 0.0);
    }

    #[test]
    fn sharp_peak_scores_high() {
        let mut lines = vec![line(500)];
        lines.extend((0..99).map(|i| line(40 - (i % 20))));
        let score = classifier().paint_score_from_lines(&lines);
        assert!(score > 0.5, "score {score}");
    }

    #[test]
    fn long_diagonal_looks_like_a_line() {
        let mut group = diagonal(500, 1000);
        group.compute_lines(1, 100);
        let reason = classifier().classify(1, &mut group).expect("classified");
        assert!(matches!(reason, PaintReason::LooksLikeALine(_)), "{reason}");
        assert!(group.will_paint());
    }

    #[test]
    fn brightness_score_is_capped() {
        let c = classifier();
        assert_eq!(c.brightness_score(0), 0.0);
        assert!((c.brightness_score(425) - 1.0).abs() < 1e-9);
        assert_eq!(c.brightness_score(u32::MAX), 100.0);
    }
}
